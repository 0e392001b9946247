use std::collections::BTreeMap;

/// Label key that opts a workload in when no other key is configured.
pub const DEFAULT_SERVICED_LABEL: &str = "serviced";

/// Manage by label
pub const MANAGED_BY_LABEL_SELECTOR: &str = "managed-by=deployment-servicer";

/// Labels that indicate the resource is managed by the servicer.
pub fn managed_labels() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from_iter(vec![(
        "managed-by".to_owned(),
        crate::CONTROLLER_NAME.to_owned(),
    )]))
}

/// Reports whether a workload opted in to servicing.
///
/// Only the presence of the key matters, its value is ignored.
/// Missing labels are treated the same as labels without the key.
pub fn is_serviced(labels: Option<&BTreeMap<String, String>>, key: &str) -> bool {
    labels.is_some_and(|labels| labels.contains_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn serviced_when_key_present() {
        let l = labels(&[("serviced", "true")]);
        assert!(is_serviced(Some(&l), DEFAULT_SERVICED_LABEL));
    }

    #[test]
    fn value_is_ignored() {
        let l = labels(&[("serviced", "false")]);
        assert!(is_serviced(Some(&l), DEFAULT_SERVICED_LABEL));
        let l = labels(&[("serviced", "")]);
        assert!(is_serviced(Some(&l), DEFAULT_SERVICED_LABEL));
    }

    #[test]
    fn not_serviced_without_labels() {
        assert!(!is_serviced(None, DEFAULT_SERVICED_LABEL));
        assert!(!is_serviced(Some(&BTreeMap::new()), DEFAULT_SERVICED_LABEL));
    }

    #[test]
    fn custom_key() {
        let l = labels(&[("serviced", "true"), ("app", "web")]);
        assert!(!is_serviced(Some(&l), "expose"));
        let l = labels(&[("expose", "yes")]);
        assert!(is_serviced(Some(&l), "expose"));
    }

    #[test]
    fn managed_selector_matches_labels() {
        let managed = managed_labels().unwrap();
        let (key, value) = MANAGED_BY_LABEL_SELECTOR.split_once('=').unwrap();
        assert_eq!(managed.get(key).map(String::as_str), Some(value));
    }
}
