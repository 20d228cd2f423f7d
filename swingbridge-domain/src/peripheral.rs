use serde::{Deserialize, Serialize};

/// An advertisement as reported by the platform scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: String,
    pub address: String,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(id: impl Into<String>, address: impl Into<String>, local_name: Option<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            local_name,
            rssi: None,
        }
    }

    pub fn try_into_handle(&self, matcher: &NameMatcher) -> Option<PeripheralHandle> {
        let name = self.local_name.as_deref()?;
        if !matcher.matches(name) {
            return None;
        }
        Some(PeripheralHandle {
            id: self.id.clone(),
            name: name.to_string(),
            address: self.address.clone(),
        })
    }
}

/// A discovered peripheral the session may connect to.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PeripheralHandle {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameMatcher {
    Prefixes(Vec<String>),
    Exact(String),
}

impl NameMatcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Prefixes(prefixes) => prefixes.iter().any(|p| name.starts_with(p.as_str())),
            NameMatcher::Exact(expected) => name == expected,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mlm2pro_matcher() -> NameMatcher {
        NameMatcher::Prefixes(vec!["MLM2-".to_string(), "BlueZ ".to_string()])
    }

    #[test]
    fn prefix_match() {
        let matcher = mlm2pro_matcher();
        assert!(matcher.matches("MLM2-12345"));
        assert!(matcher.matches("BlueZ 5.64"));
        assert!(!matcher.matches("mlm2-12345"));
        assert!(!matcher.matches("Approach R10"));
    }

    #[test]
    fn exact_match() {
        let matcher = NameMatcher::Exact("Approach R10".to_string());
        assert!(matcher.matches("Approach R10"));
        assert!(!matcher.matches("Approach R10 2"));
    }

    #[test]
    fn unnamed_advertisement_never_matches() {
        let ad = Advertisement::new("id-1", "AA:BB", None);
        assert_eq!(ad.try_into_handle(&mlm2pro_matcher()), None);
    }

    #[test]
    fn matching_advertisement_becomes_handle() {
        let ad = Advertisement::new("id-1", "AA:BB", Some("MLM2-12345".to_string()));
        assert_eq!(
            ad.try_into_handle(&mlm2pro_matcher()),
            Some(PeripheralHandle {
                id: "id-1".to_string(),
                name: "MLM2-12345".to_string(),
                address: "AA:BB".to_string(),
            })
        );
    }
}
