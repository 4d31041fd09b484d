//! Parser for `MAIL`/`RCPT` argument strings.
//!
//! Accepts both `KEY:<VALUE>` and `KEY=VALUE` pairs in one grammar, so
//! `FROM:<a@example.com> SIZE=1234` yields `FROM` and `SIZE`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Name,
    Separator,
    ValueUntilSpace,
    ValueUntilGreaterThan,
}

/// Extracts `KEY=VALUE` and `KEY:<VALUE>` pairs from a command's arguments.
///
/// Keys are uppercased; values keep their case. Input that is not
/// well-formed yields an empty map so the caller reports the missing
/// argument itself.
#[must_use]
pub fn parse_arguments(input: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();
    let mut name = String::new();
    let mut value = String::new();
    let mut state = State::Name;

    for ch in input.chars() {
        match state {
            State::Name => match ch {
                'A'..='Z' | 'a'..='z' => name.push(ch.to_ascii_uppercase()),
                '=' => state = State::ValueUntilSpace,
                ':' => state = State::Separator,
                ' ' => {}
                _ => return HashMap::new(),
            },
            State::Separator => match ch {
                '<' => state = State::ValueUntilGreaterThan,
                ' ' => {}
                _ => return HashMap::new(),
            },
            State::ValueUntilSpace => {
                if ch == ' ' {
                    args.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    state = State::Name;
                } else {
                    value.push(ch);
                }
            }
            State::ValueUntilGreaterThan => {
                if ch == '>' {
                    args.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    state = State::Name;
                } else {
                    value.push(ch);
                }
            }
        }
    }

    if !name.is_empty() && !value.is_empty() {
        args.insert(name, value);
    }

    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mail_from_with_size() {
        let args = parse_arguments("FROM:<a@localhost> SIZE=1234");
        assert_eq!(args.get("FROM").unwrap(), "a@localhost");
        assert_eq!(args.get("SIZE").unwrap(), "1234");
    }

    #[test]
    fn keys_fold_values_keep_case() {
        let args = parse_arguments("tO:<Bob@Example.com>");
        assert_eq!(args.get("TO").unwrap(), "Bob@Example.com");
    }

    #[test]
    fn space_after_colon() {
        let args = parse_arguments("FROM: <a@localhost>");
        assert_eq!(args.get("FROM").unwrap(), "a@localhost");
    }

    #[test]
    fn key_value_pairs() {
        let args = parse_arguments("BODY=8BITMIME RET=HDRS");
        assert_eq!(args.get("BODY").unwrap(), "8BITMIME");
        assert_eq!(args.get("RET").unwrap(), "HDRS");
    }

    #[test]
    fn digit_in_name_aborts() {
        assert!(parse_arguments("SMTPUTF8=yes").is_empty());
    }

    #[test]
    fn empty_angle_value_is_committed() {
        let args = parse_arguments("FROM:<>");
        assert_eq!(args.get("FROM").map(String::as_str), Some(""));
    }

    #[test]
    fn malformed_yields_nothing() {
        assert!(parse_arguments("FROM:a@localhost").is_empty());
        assert!(parse_arguments("X-ID=1").is_empty());
        assert!(parse_arguments("<a@localhost>").is_empty());
    }

    #[test]
    fn unterminated_angle_value_is_dropped() {
        let args = parse_arguments("FROM:<a@localhost");
        assert!(args.is_empty());
    }

    #[test]
    fn trailing_pair_without_space() {
        let args = parse_arguments("SIZE=10");
        assert_eq!(args.get("SIZE").unwrap(), "10");
    }

    #[test]
    fn name_without_value_is_dropped() {
        assert!(parse_arguments("FROM").is_empty());
        assert!(parse_arguments("").is_empty());
    }

    proptest! {
        #[test]
        fn never_panics(input in "\\PC{0,64}") {
            let _ = parse_arguments(&input);
        }

        #[test]
        fn extracts_any_path_and_size(local in "[a-zA-Z0-9.]{1,16}", size in 1usize..10_000_000) {
            let args = parse_arguments(&format!("FROM:<{local}@example.com> SIZE={size}"));
            let expected = format!("{local}@example.com");
            prop_assert_eq!(args.get("FROM"), Some(&expected));
            prop_assert_eq!(args.get("SIZE"), Some(&size.to_string()));
        }
    }
}
