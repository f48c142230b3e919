use uuid::{Uuid, Variant};

/// Length of the canonical hyphenated form (8-4-4-4-12).
const HYPHENATED_LEN: usize = 36;

/// Check an identifier against the canonical UUID textual format.
///
/// Only the hyphenated layout is accepted (no braces, URN prefix or simple
/// form). Hex digits are case-insensitive, the version nibble must be 1-5 and
/// the variant nibble one of 8, 9, a, b.
pub fn is_valid_uuid(s: &str) -> bool {
    if s.len() != HYPHENATED_LEN {
        return false;
    }
    let Ok(id) = Uuid::try_parse(s) else {
        return false;
    };
    matches!(id.get_version_num(), 1..=5) && id.get_variant() == Variant::RFC4122
}

/// Labels of every `(label, value)` pair whose value is not a valid UUID,
/// in input order.
pub fn invalid_fields<'a>(fields: &[(&'a str, &str)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| !is_valid_uuid(value))
        .map(|(label, _)| *label)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_random_v4() {
        assert!(is_valid_uuid(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn accepts_uppercase() {
        assert!(is_valid_uuid("6F9619FF-8B86-4011-B42D-00C04FC964FF"));
    }

    #[test]
    fn accepts_version_one() {
        assert!(is_valid_uuid("a8098c1a-f86e-11da-bd1a-00112444be1e"));
    }

    #[test]
    fn rejects_out_of_range_version() {
        // version nibble 0 (nil) and 6
        assert!(!is_valid_uuid("00000000-0000-0000-0000-000000000000"));
        assert!(!is_valid_uuid("1ec9414c-232a-6b00-b3c8-9e6bdeced846"));
    }

    #[test]
    fn rejects_wrong_variant() {
        assert!(!is_valid_uuid("6f9619ff-8b86-4011-c42d-00c04fc964ff"));
    }

    #[test]
    fn rejects_non_hyphenated_forms() {
        assert!(!is_valid_uuid("6f9619ff8b864011b42d00c04fc964ff"));
        assert!(!is_valid_uuid("{6f9619ff-8b86-4011-b42d-00c04fc964ff}"));
        assert!(!is_valid_uuid(
            "urn:uuid:6f9619ff-8b86-4011-b42d-00c04fc964ff"
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(!is_valid_uuid("not-a-uuid"));
        assert!(!is_valid_uuid(""));
        assert!(!is_valid_uuid("6f9619ff-8b86-4011-b42d-00c04fc964fg"));
    }

    #[test]
    fn invalid_fields_names_offenders_in_order() {
        let good = Uuid::new_v4().to_string();
        let fields = [
            ("Current User ID", "not-a-uuid"),
            ("Other User ID", good.as_str()),
            ("Task ID", "42"),
        ];
        assert_eq!(invalid_fields(&fields), vec!["Current User ID", "Task ID"]);
    }

    #[test]
    fn invalid_fields_empty_when_all_valid() {
        let a = Uuid::new_v4().to_string();
        let b = Uuid::new_v4().to_string();
        assert!(invalid_fields(&[("a", a.as_str()), ("b", b.as_str())]).is_empty());
    }
}
