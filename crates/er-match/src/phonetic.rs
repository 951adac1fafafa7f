//! In-process phonetic encoding (American Soundex). Spec §9 leaves the choice
//! of phonetic primitive open as long as it behaves like the original's
//! "soundex or metaphone token"; Soundex is the simplest one that satisfies
//! the invariant in `EntityMatchField` (`match_type = phonetic` rows carry a
//! `token`, compared by equality).

/// Encodes `input` as a 4-character Soundex code (e.g. `"Robert" -> "R163"`).
/// Empty input encodes to an empty string so callers can skip emitting a row.
#[must_use]
pub fn soundex(input: &str) -> String {
    let letters: Vec<char> = input.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = String::new();
    code.push(first.to_ascii_uppercase());

    let mut last_digit = soundex_digit(first);
    for &ch in &letters[1..] {
        let digit = soundex_digit(ch);
        if digit != 0 && digit != last_digit {
            code.push(char::from_digit(digit as u32, 10).unwrap());
        }
        if !matches!(ch.to_ascii_lowercase(), 'h' | 'w') {
            last_digit = digit;
        }
        if code.len() == 4 {
            break;
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn soundex_digit(ch: char) -> u8 {
    match ch.to_ascii_lowercase() {
        'b' | 'f' | 'p' | 'v' => 1,
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
        'd' | 't' => 3,
        'l' => 4,
        'm' | 'n' => 5,
        'r' => 6,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_classic_examples() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Ashcraft"), "A261");
        assert_eq!(soundex("Smith"), soundex("Smyth"));
    }

    #[test]
    fn empty_input_yields_empty_token() {
        assert_eq!(soundex(""), "");
        assert_eq!(soundex("123"), "");
    }
}
