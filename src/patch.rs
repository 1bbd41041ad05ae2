//! Three-state field wrapper for partial updates.
//!
//! A JSON key that is missing leaves the stored value alone, an explicit `null` clears it,
//! and any other value replaces it. Fields must carry `#[serde(default)]` so a missing key
//! lands on [`Patch::Keep`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    /// Apply this patch to an optional slot.
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(v) => *slot = Some(v),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(v) => serializer.serialize_some(v),
            _ => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Partial {
        #[serde(default)]
        timezone: Patch<String>,
    }

    #[test]
    fn test_missing_key_keeps() {
        let p: Partial = serde_json::from_str("{}").unwrap();
        assert_eq!(p.timezone, Patch::Keep);
    }

    #[test]
    fn test_null_clears() {
        let p: Partial = serde_json::from_str(r#"{"timezone": null}"#).unwrap();
        assert_eq!(p.timezone, Patch::Clear);
    }

    #[test]
    fn test_value_sets() {
        let p: Partial = serde_json::from_str(r#"{"timezone": "Europe/Paris"}"#).unwrap();
        assert_eq!(p.timezone, Patch::Set("Europe/Paris".to_string()));
    }

    #[test]
    fn test_apply_to() {
        let mut slot = Some(1);
        Patch::Keep.apply_to(&mut slot);
        assert_eq!(slot, Some(1));
        Patch::Set(2).apply_to(&mut slot);
        assert_eq!(slot, Some(2));
        Patch::<i32>::Clear.apply_to(&mut slot);
        assert_eq!(slot, None);
    }
}
