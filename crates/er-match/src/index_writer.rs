//! Translates a staged entity's payload into indexed [`EntityMatchField`]
//! rows per the tenant's [`MatchFieldMapping`]s (spec §4.2). Grounded in the
//! shape of the merge/match writers elsewhere in this workspace: load
//! configuration, transform, replace transactionally.

use er_store::{MatchFieldStore, StagedEntityStore};
use er_types::error::MatchError;
use er_types::ids::{StagedEntityId, TenantId};
use er_types::json_path;
use er_types::match_types::{ArrayHandling, EntityMatchField, MatchFieldMapping, MatchType};
use er_types::value::Value;
use error_stack::{Result, ResultExt};

use crate::phonetic::soundex;

/// Extracts, normalizes, and replaces the match-field set for one staged
/// entity. `store` must support both reading the tenant's field mappings and
/// writing the replacement rows.
pub struct MatchIndexWriter<'s, S> {
    store: &'s S,
}

impl<'s, S> MatchIndexWriter<'s, S>
where
    S: MatchFieldStore + StagedEntityStore,
{
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    #[tracing::instrument(level = "debug", skip(self, data))]
    pub async fn write_for_entity(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        staged_entity_id: StagedEntityId,
        data: &Value,
    ) -> Result<(), MatchError> {
        let mappings = self
            .store
            .mappings_for_type(tenant_id, entity_type)
            .await
            .change_context(MatchError)?;

        let mut fields = Vec::new();
        for mapping in &mappings {
            fields.extend(extract_fields(tenant_id, entity_type, staged_entity_id, mapping, data));
        }

        // `replace_fields` overwrites the entity's entire field set (spec §4.2
        // step 5: delete-all then insert), so the whole batch goes in one call.
        self.store
            .replace_fields(tenant_id, staged_entity_id, fields)
            .await
            .change_context(MatchError)?;
        Ok(())
    }
}

fn extract_fields(
    tenant_id: TenantId,
    entity_type: &str,
    staged_entity_id: StagedEntityId,
    mapping: &MatchFieldMapping,
    data: &Value,
) -> Vec<EntityMatchField> {
    let extracted = json_path::extract(data, &mapping.source_path);
    let Some(text) = collapse(&extracted, mapping) else {
        return Vec::new();
    };
    let normalized = mapping.normalizer.apply(&text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut rows = vec![base_row(
        tenant_id,
        entity_type,
        staged_entity_id,
        mapping,
        MatchType::Exact,
        Some(normalized.clone()),
        None,
    )];
    if mapping.include_trigram {
        rows.push(base_row(
            tenant_id,
            entity_type,
            staged_entity_id,
            mapping,
            MatchType::Fuzzy,
            Some(normalized.clone()),
            None,
        ));
    }
    if mapping.include_phonetic {
        let token = soundex(&normalized);
        if !token.is_empty() {
            rows.push(base_row(
                tenant_id,
                entity_type,
                staged_entity_id,
                mapping,
                MatchType::Phonetic,
                None,
                Some(token),
            ));
        }
    }
    rows
}

fn base_row(
    tenant_id: TenantId,
    entity_type: &str,
    staged_entity_id: StagedEntityId,
    mapping: &MatchFieldMapping,
    match_type: MatchType,
    value_text: Option<String>,
    token: Option<String>,
) -> EntityMatchField {
    EntityMatchField {
        tenant_id,
        entity_type: entity_type.to_owned(),
        staged_entity_id,
        field: mapping.target_column.clone(),
        match_type,
        normalizer: mapping.normalizer,
        value_text,
        value_num: None,
        value_ts: None,
        token,
    }
}

fn collapse(values: &[&Value], mapping: &MatchFieldMapping) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    match mapping.array_handling {
        ArrayHandling::First => values.first().and_then(|v| v.as_str()).map(str::to_owned),
        ArrayHandling::Last => values.last().and_then(|v| v.as_str()).map(str::to_owned),
        ArrayHandling::Join => {
            let joined = values
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(",");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        ArrayHandling::Filter => {
            let needle = mapping.array_filter.as_deref()?;
            values
                .iter()
                .find(|v| v.as_str() == Some(needle))
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        }
    }
}

#[cfg(test)]
mod tests {
    use er_types::match_types::Normalizer;

    use super::*;

    fn mapping(source_path: &str, target: &str) -> MatchFieldMapping {
        MatchFieldMapping {
            tenant_id: TenantId::new(),
            entity_type: "person".to_owned(),
            source_path: source_path.to_owned(),
            target_column: target.to_owned(),
            normalizer: Normalizer::Lowercase,
            array_handling: ArrayHandling::First,
            array_filter: None,
            include_phonetic: true,
            include_trigram: true,
        }
    }

    #[test]
    fn emits_exact_fuzzy_and_phonetic_rows() {
        let data = Value::Object(
            [("last_name".to_owned(), Value::Str("Smith".to_owned()))]
                .into_iter()
                .collect(),
        );
        let mapping = mapping("last_name", "last_name");
        let rows = extract_fields(mapping.tenant_id, "person", StagedEntityId::new(), &mapping, &data);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().any(|r| r.match_type == MatchType::Exact && r.value_text.as_deref() == Some("smith")));
        assert!(rows.iter().any(|r| r.match_type == MatchType::Fuzzy));
        assert!(rows.iter().any(|r| r.match_type == MatchType::Phonetic && r.token.as_deref() == Some("S530")));
    }

    #[test]
    fn missing_path_yields_no_rows() {
        let data = Value::Object(Default::default());
        let mapping = mapping("last_name", "last_name");
        let rows = extract_fields(mapping.tenant_id, "person", StagedEntityId::new(), &mapping, &data);
        assert!(rows.is_empty());
    }
}
