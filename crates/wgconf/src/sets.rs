// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Deduplicated collections of IP addresses and networks.

use std::collections::HashSet;
use std::collections::hash_set;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("Cannot add an empty value to {0}")]
    Empty(&'static str),

    #[error("Cannot extend {0} with an empty collection")]
    EmptyBatch(&'static str),

    #[error("Could not convert to {kind}: {value:?}")]
    Invalid { kind: &'static str, value: String },
}

/// A member type of a [`ClassedSet`]: parsed from text, rendered back with `Display`.
pub trait Coerce: Sized + Eq + Hash + Clone + fmt::Display {
    const SET_NAME: &'static str;
    const KIND: &'static str;

    fn coerce(value: &str) -> Result<Self, CoercionError>;
}

impl Coerce for IpAddr {
    const SET_NAME: &'static str = "AddressSet";
    const KIND: &'static str = "IP Address";

    fn coerce(value: &str) -> Result<Self, CoercionError> {
        value.parse().map_err(|_| CoercionError::Invalid {
            kind: Self::KIND,
            value: value.to_string(),
        })
    }
}

impl Coerce for IpNetwork {
    const SET_NAME: &'static str = "NetworkSet";
    const KIND: &'static str = "IP Network";

    /// Strict: `10.0.0.5/24` is rejected, a bare address becomes a host route.
    fn coerce(value: &str) -> Result<Self, CoercionError> {
        let invalid = || CoercionError::Invalid {
            kind: Self::KIND,
            value: value.to_string(),
        };

        let net: IpNetwork = value.parse().map_err(|_| invalid())?;
        if net.ip() != net.network() {
            return Err(invalid());
        }
        Ok(net)
    }
}

/// A set whose members are all valid values of `T`, with no empty entries.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassedSet<T: Coerce> {
    items: HashSet<T>,
}

pub type AddressSet = ClassedSet<IpAddr>;
pub type NetworkSet = ClassedSet<IpNetwork>;

impl<T: Coerce> Default for ClassedSet<T> {
    fn default() -> Self {
        Self {
            items: HashSet::new(),
        }
    }
}

impl<T: Coerce> ClassedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `value` and adds it. Returns whether it was newly inserted.
    pub fn add(&mut self, value: &str) -> Result<bool, CoercionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CoercionError::Empty(T::SET_NAME));
        }
        Ok(self.items.insert(T::coerce(value)?))
    }

    pub fn insert(&mut self, value: T) -> bool {
        self.items.insert(value)
    }

    /// Adds every element; stops at the first that fails to coerce.
    pub fn extend<I, S>(&mut self, values: I) -> Result<(), CoercionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = false;
        for value in values {
            seen = true;
            self.add(value.as_ref())?;
        }
        if !seen {
            return Err(CoercionError::EmptyBatch(T::SET_NAME));
        }
        Ok(())
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.items.remove(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, T> {
        self.items.iter()
    }

    /// Members ordered by their string form, for reproducible output.
    pub fn sorted(&self) -> Vec<T> {
        let mut items: Vec<(String, T)> = self
            .items
            .iter()
            .map(|item| (item.to_string(), item.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items.into_iter().map(|(_, item)| item).collect()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.sorted().iter().map(ToString::to_string).collect()
    }
}

impl<T: Coerce> fmt::Display for ClassedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_strings().join(","))
    }
}

impl<T: Coerce> fmt::Debug for ClassedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.to_strings()).finish()
    }
}

impl<T: Coerce> FromIterator<T> for ClassedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T: Coerce> IntoIterator for &'a ClassedSet<T> {
    type Item = &'a T;
    type IntoIter = hash_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ---- serde: a sorted list of strings ----

impl<T: Coerce> Serialize for ClassedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = self.to_strings();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in &items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

struct ClassedSetVisitor<T>(PhantomData<T>);

impl<'de, T: Coerce> Visitor<'de> for ClassedSetVisitor<T> {
    type Value = ClassedSet<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a list of {} strings", T::KIND)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut set = ClassedSet::new();
        while let Some(item) = seq.next_element::<String>()? {
            set.add(&item).map_err(de::Error::custom)?;
        }
        Ok(set)
    }
}

impl<'de, T: Coerce> Deserialize<'de> for ClassedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(ClassedSetVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10.0.0.1" ; "ipv4")]
    #[test_case("fd00::1" ; "ipv6")]
    fn address_set_accepts(value: &str) {
        let mut set = AddressSet::new();
        assert!(set.add(value).unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "whitespace")]
    fn address_set_rejects_empty(value: &str) {
        let mut set = AddressSet::new();
        assert_eq!(set.add(value), Err(CoercionError::Empty("AddressSet")));
    }

    #[test_case("true" ; "boolean literal")]
    #[test_case("10.0.0.256" ; "octet out of range")]
    #[test_case("10.0.0.0/24" ; "network in address set")]
    fn address_set_rejects_garbage(value: &str) {
        let mut set = AddressSet::new();
        let err = set.add(value).unwrap_err();
        assert!(err.to_string().contains("Could not convert to IP Address"));
    }

    #[test]
    fn network_set_bare_address_is_host_route() {
        let mut set = NetworkSet::new();
        set.add("10.0.0.7").unwrap();
        set.add("fd00::7").unwrap();
        assert_eq!(set.to_strings(), vec!["10.0.0.7/32", "fd00::7/128"]);
    }

    #[test]
    fn network_set_is_strict() {
        let mut set = NetworkSet::new();
        let err = set.add("10.0.0.5/24").unwrap_err();
        assert!(err.to_string().contains("Could not convert to IP Network"));
    }

    #[test]
    fn re_add_is_idempotent() {
        let mut set = NetworkSet::new();
        assert!(set.add("10.0.0.0/24").unwrap());
        assert!(!set.add("10.0.0.0/24").unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn extend_rejects_empty_batch() {
        let mut set = AddressSet::new();
        let values: Vec<&str> = Vec::new();
        assert_eq!(
            set.extend(values),
            Err(CoercionError::EmptyBatch("AddressSet"))
        );
    }

    #[test]
    fn extend_adds_all() {
        let mut set = AddressSet::new();
        set.extend(["1.1.1.1", "8.8.8.8", "1.1.1.1"]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn sorted_is_by_string_form() {
        let mut set = AddressSet::new();
        set.extend(["9.9.9.9", "10.0.0.1", "1.1.1.1"]).unwrap();
        assert_eq!(set.to_string(), "1.1.1.1,10.0.0.1,9.9.9.9");
    }

    #[test]
    fn serde_as_sorted_strings() {
        let mut set = NetworkSet::new();
        set.extend(["192.168.0.0/24", "10.0.0.0/8"]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["10.0.0.0/8","192.168.0.0/24"]"#);

        let back: NetworkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn deserialize_rejects_invalid_member() {
        let res: Result<AddressSet, _> = serde_json::from_str(r#"["not-an-ip"]"#);
        assert!(res.is_err());
    }
}
