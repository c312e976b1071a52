use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// One entry of the `tts_params` table as supplied by the config collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterDef {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub group: String,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    /// Query-string name used by the synthesis service. Carried, not interpreted.
    #[serde(default)]
    pub url_param: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Parameter definitions in the order they appear in the source document.
///
/// Order matters: within a group the first definition becomes the X axis.
#[derive(Debug, Clone, Default)]
pub struct ParameterDefs(Vec<(String, ParameterDef)>);

impl ParameterDefs {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterDef)> {
        self.0.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParameterDef)> for ParameterDefs {
    fn from_iter<I: IntoIterator<Item = (String, ParameterDef)>>(iter: I) -> Self {
        ParameterDefs(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for ParameterDefs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DefsVisitor;

        impl<'de> Visitor<'de> for DefsVisitor {
            type Value = ParameterDefs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter key to definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut defs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, def)) = map.next_entry::<String, ParameterDef>()? {
                    defs.push((key, def));
                }
                Ok(ParameterDefs(defs))
            }
        }

        deserializer.deserialize_map(DefsVisitor)
    }
}

/// A tunable synthesis parameter with a value kept inside `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: String,
    pub display_name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub group: String,
    pub url_param: Option<String>,
    value: Option<f64>,
}

impl Parameter {
    fn from_def(key: &str, def: &ParameterDef) -> Result<Self, ConfigError> {
        for (field, v) in [("min", def.min), ("max", def.max), ("default", def.default)] {
            if !v.is_finite() {
                return Err(ConfigError::NonFinite {
                    key: key.to_string(),
                    field,
                });
            }
        }
        check_bounds(key, def.min, def.max)?;

        let mut param = Parameter {
            key: key.to_string(),
            display_name: def.display_name.clone().unwrap_or_else(|| key.to_string()),
            min: def.min,
            max: def.max,
            default: def.default.clamp(def.min, def.max),
            group: def.group.clone(),
            url_param: def.url_param.clone(),
            value: None,
        };
        if let Some(v) = def.value {
            param.set_value(v);
        }
        Ok(param)
    }

    /// Committed value, or the default if nothing has been set yet.
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(self.default)
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Store `v` clamped into bounds and return what was stored. NaN is ignored.
    pub fn set_value(&mut self, v: f64) -> f64 {
        if !v.is_nan() {
            self.value = Some(self.clamp(v));
        }
        self.value()
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    /// Position of `v` inside the bounds, 0.0 at `min` and 1.0 at `max`.
    pub fn normalize(&self, v: f64) -> f64 {
        (v - self.min) / (self.max - self.min)
    }

    /// Value at `percent` of the range, clamped so rounding never escapes the bounds.
    pub fn denormalize(&self, percent: f64) -> f64 {
        self.clamp(self.min + (self.max - self.min) * percent)
    }
}

fn check_bounds(key: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min == max {
        return Err(ConfigError::ZeroWidthBounds {
            key: key.to_string(),
            min,
        });
    }
    if min > max {
        return Err(ConfigError::InvertedBounds {
            key: key.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

/// Two parameters driven by one control surface. `x` was defined first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGroup {
    pub tag: String,
    pub x: String,
    pub y: String,
}

impl ParameterGroup {
    pub fn keys(&self) -> [&str; 2] {
        [self.x.as_str(), self.y.as_str()]
    }
}

/// The canonical parameter set, in definition order.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn from_defs(defs: &ParameterDefs) -> Result<Self, ConfigError> {
        let mut params: Vec<Parameter> = Vec::with_capacity(defs.len());
        for (key, def) in defs.iter() {
            if params.iter().any(|p| p.key == key) {
                return Err(ConfigError::DuplicateKey(key.to_string()));
            }
            params.push(Parameter::from_def(key, def)?);
        }
        Ok(ParameterSet { params })
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.key == key)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Clamp and commit a value. Returns the stored value, or `None` for an unknown key.
    pub fn set_value(&mut self, key: &str, v: f64) -> Option<f64> {
        self.get_mut(key).map(|p| p.set_value(v))
    }

    /// Current values keyed by parameter, as sent in `ttsData`.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.params
            .iter()
            .map(|p| (p.key.clone(), p.value()))
            .collect()
    }

    /// Partition into two-parameter groups, in order of first appearance.
    ///
    /// Parameters without a committed value get their default. Values that
    /// were already set are left alone, so calling this again is harmless.
    pub fn group(&mut self) -> Result<Vec<ParameterGroup>, ConfigError> {
        let mut members: Vec<(String, Vec<String>)> = Vec::new();
        for param in &mut self.params {
            check_bounds(&param.key, param.min, param.max)?;
            if param.value.is_none() {
                param.value = Some(param.default);
            }
            match members.iter_mut().find(|(tag, _)| *tag == param.group) {
                Some((_, keys)) => keys.push(param.key.clone()),
                None => members.push((param.group.clone(), vec![param.key.clone()])),
            }
        }

        members
            .into_iter()
            .map(|(tag, keys)| match <[String; 2]>::try_from(keys) {
                Ok([x, y]) => Ok(ParameterGroup { tag, x, y }),
                Err(keys) => Err(ConfigError::GroupSize {
                    group: tag,
                    count: keys.len(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(min: f64, max: f64, default: f64, group: &str) -> ParameterDef {
        ParameterDef {
            min,
            max,
            default,
            group: group.to_string(),
            display_name: None,
            url_param: None,
            value: None,
        }
    }

    fn defs(entries: &[(&str, ParameterDef)]) -> ParameterDefs {
        entries
            .iter()
            .map(|(k, d)| (k.to_string(), d.clone()))
            .collect()
    }

    #[test]
    fn groups_preserve_definition_order() {
        let mut set = ParameterSet::from_defs(&defs(&[
            ("tone", def(0.0, 10.0, 5.0, "g1")),
            ("speed", def(0.5, 2.0, 1.0, "g2")),
            ("energy", def(0.0, 10.0, 5.0, "g1")),
            ("pitch", def(-1.0, 1.0, 0.0, "g2")),
        ]))
        .unwrap();

        let groups = set.group().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tag, "g1");
        assert_eq!(groups[0].keys(), ["tone", "energy"]);
        assert_eq!(groups[1].tag, "g2");
        assert_eq!(groups[1].keys(), ["speed", "pitch"]);
    }

    #[test]
    fn grouping_initializes_missing_values_to_default() {
        let mut set = ParameterSet::from_defs(&defs(&[
            ("tone", def(0.0, 10.0, 3.0, "g1")),
            ("energy", def(0.0, 10.0, 7.0, "g1")),
        ]))
        .unwrap();
        assert!(!set.get("tone").unwrap().has_value());

        set.group().unwrap();
        assert_eq!(set.get("tone").unwrap().value(), 3.0);
        assert_eq!(set.get("energy").unwrap().value(), 7.0);
    }

    #[test]
    fn regrouping_keeps_committed_values() {
        let mut set = ParameterSet::from_defs(&defs(&[
            ("tone", def(0.0, 10.0, 5.0, "g1")),
            ("energy", def(0.0, 10.0, 5.0, "g1")),
        ]))
        .unwrap();
        set.group().unwrap();
        set.set_value("tone", 0.0);

        set.group().unwrap();
        assert_eq!(set.get("tone").unwrap().value(), 0.0);
    }

    #[test]
    fn values_stay_in_bounds() {
        let mut d = def(0.0, 10.0, 25.0, "g1");
        d.value = Some(-4.0);
        let mut set = ParameterSet::from_defs(&defs(&[
            ("tone", d),
            ("energy", def(0.0, 10.0, 5.0, "g1")),
        ]))
        .unwrap();
        set.group().unwrap();

        assert_eq!(set.get("tone").unwrap().value(), 0.0);
        assert_eq!(set.get("tone").unwrap().default, 10.0);
        assert_eq!(set.set_value("energy", 99.0), Some(10.0));
        assert_eq!(set.set_value("energy", f64::NAN), Some(10.0));
        for p in set.iter() {
            assert!(p.min <= p.value() && p.value() <= p.max);
        }
    }

    #[test]
    fn single_member_group_is_rejected() {
        let mut set = ParameterSet::from_defs(&defs(&[
            ("tone", def(0.0, 10.0, 5.0, "g1")),
            ("energy", def(0.0, 10.0, 5.0, "g1")),
            ("speed", def(0.0, 2.0, 1.0, "lonely")),
        ]))
        .unwrap();

        match set.group() {
            Err(ConfigError::GroupSize { group, count }) => {
                assert_eq!(group, "lonely");
                assert_eq!(count, 1);
            }
            other => panic!("expected GroupSize error, got {other:?}"),
        }
    }

    #[test]
    fn three_member_group_is_rejected() {
        let mut set = ParameterSet::from_defs(&defs(&[
            ("a", def(0.0, 1.0, 0.5, "g")),
            ("b", def(0.0, 1.0, 0.5, "g")),
            ("c", def(0.0, 1.0, 0.5, "g")),
        ]))
        .unwrap();
        assert!(matches!(
            set.group(),
            Err(ConfigError::GroupSize { count: 3, .. })
        ));
    }

    #[test]
    fn zero_width_bounds_are_rejected() {
        let err = ParameterSet::from_defs(&defs(&[("flat", def(2.0, 2.0, 2.0, "g"))])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWidthBounds { .. }));
    }

    #[test]
    fn inverted_and_non_finite_bounds_are_rejected() {
        let err = ParameterSet::from_defs(&defs(&[("x", def(5.0, 1.0, 2.0, "g"))])).unwrap_err();
        assert!(matches!(err, ConfigError::InvertedBounds { .. }));

        let unbounded = defs(&[("x", def(0.0, f64::INFINITY, 2.0, "g"))]);
        let err = ParameterSet::from_defs(&unbounded).unwrap_err();
        assert!(matches!(err, ConfigError::NonFinite { field: "max", .. }));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = ParameterSet::from_defs(&defs(&[
            ("tone", def(0.0, 1.0, 0.5, "g")),
            ("tone", def(0.0, 1.0, 0.5, "g")),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(k) if k == "tone"));
    }

    #[test]
    fn normalize_and_denormalize() {
        let set = ParameterSet::from_defs(&defs(&[("speed", def(0.5, 2.5, 1.0, "g"))])).unwrap();
        let p = set.get("speed").unwrap();
        assert_eq!(p.normalize(1.5), 0.5);
        assert_eq!(p.denormalize(0.5), 1.5);
        assert_eq!(p.denormalize(1.0000001), 2.5);
        assert_eq!(p.denormalize(-0.2), 0.5);
    }

    #[test]
    fn defs_deserialize_in_document_order() {
        let json = r#"{
            "zeta":  {"min": 0, "max": 1, "default": 0.5, "group": "g", "displayName": "Zeta"},
            "alpha": {"min": 0, "max": 1, "default": 0.5, "group": "g", "url_param": "a"}
        }"#;
        let defs: ParameterDefs = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = defs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zeta", "alpha"]);

        let set = ParameterSet::from_defs(&defs).unwrap();
        assert_eq!(set.get("zeta").unwrap().display_name, "Zeta");
        assert_eq!(set.get("alpha").unwrap().display_name, "alpha");
        assert_eq!(set.get("alpha").unwrap().url_param.as_deref(), Some("a"));
    }
}
