//! Alias resolution for body and frame identifiers.
//!
//! An alias group collects every code and name that denotes one logical body
//! or frame, in strict priority order. Groups are shared: every member looks
//! up the same `Arc<AliasGroup>`. Defining an equivalence that touches
//! several existing groups merges them.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use spx_model::Value;
use tracing::{debug, trace};

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Code(i64),
    Name(String),
}

impl Identifier {
    /// Ints become codes and strings names; other values are not identifiers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(code) => Some(Identifier::Code(*code)),
            Value::Str(name) => Some(Identifier::Name(name.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Identifier::Code(code) => Value::Int(*code),
            Identifier::Name(name) => Value::Str(name.clone()),
        }
    }

    pub fn form(&self) -> IdentifierForm {
        match self {
            Identifier::Code(_) => IdentifierForm::Code,
            Identifier::Name(_) => IdentifierForm::Name,
        }
    }

    fn key(&self) -> AliasKey {
        match self {
            Identifier::Code(code) => AliasKey::Code(*code),
            Identifier::Name(name) => AliasKey::Name(normalize_name(name)),
        }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Code(code) => write!(f, "{code}"),
            Identifier::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<i64> for Identifier {
    fn from(code: i64) -> Self {
        Identifier::Code(code)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Identifier::Name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasDomain {
    Body,
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierForm {
    Code,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AliasKey {
    Code(i64),
    Name(String),
}

/// Lookup key for a name: upper-cased, trimmed, inner whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Interchangeable identifiers of one body or frame, preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasGroup {
    members: Vec<Identifier>,
    codes: Vec<i64>,
    names: Vec<String>,
    declared_names: usize,
}

impl AliasGroup {
    fn from_members(members: Vec<Identifier>) -> Self {
        let codes: Vec<i64> = members
            .iter()
            .filter_map(|m| match m {
                Identifier::Code(code) => Some(*code),
                Identifier::Name(_) => None,
            })
            .collect();
        let names: Vec<String> = members
            .iter()
            .filter_map(|m| match m {
                Identifier::Name(name) => Some(name.clone()),
                Identifier::Code(_) => None,
            })
            .collect();
        let declared_names = names.len();
        Self {
            members,
            codes,
            names,
            declared_names,
        }
    }

    fn singleton(identifier: &Identifier) -> Self {
        Self::from_members(vec![identifier.clone()])
    }

    /// Pads the name list with versioned names so every code has a name.
    ///
    /// The lowest-priority code receives `V1`. A version already in use
    /// elsewhere is bumped to the next free one.
    fn add_synthetic_names(&mut self, taken: impl Fn(&str) -> bool) {
        let Some(base) = self.names.first().cloned() else {
            return;
        };
        let total = self.codes.len();
        for position in self.declared_names..total {
            let mut version = total - position;
            let name = loop {
                let name = format!("{base} V{version}");
                let key = normalize_name(&name);
                let in_group = self.names.iter().any(|n| normalize_name(n) == key);
                if !in_group && !taken(&key) {
                    break name;
                }
                version += 1;
            };
            self.names.push(name);
        }
    }

    /// Declared members in priority order.
    pub fn members(&self) -> &[Identifier] {
        &self.members
    }

    pub fn codes(&self) -> &[i64] {
        &self.codes
    }

    /// Declared names followed by synthetic versioned names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn synthetic_names(&self) -> &[String] {
        &self.names[self.declared_names..]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        let key = identifier.key();
        self.keys().any(|k| k == key)
    }

    pub fn preferred_code(&self) -> Option<i64> {
        self.codes.first().copied()
    }

    pub fn preferred_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Code paired with a name; surplus names map to the preferred code.
    pub fn code_for_name(&self, name: &str) -> Option<i64> {
        let key = normalize_name(name);
        let position = self.names.iter().position(|n| normalize_name(n) == key)?;
        self.codes
            .get(position)
            .or_else(|| self.codes.first())
            .copied()
    }

    /// Name paired with a code.
    pub fn name_for_code(&self, code: i64) -> Option<&str> {
        let position = self.codes.iter().position(|c| *c == code)?;
        self.names.get(position).map(String::as_str)
    }

    /// Codes or names of the group in priority order.
    pub fn candidates(&self, form: IdentifierForm) -> Vec<Identifier> {
        match form {
            IdentifierForm::Code => self.codes.iter().copied().map(Identifier::Code).collect(),
            IdentifierForm::Name => self.names.iter().cloned().map(Identifier::Name).collect(),
        }
    }

    fn keys(&self) -> impl Iterator<Item = AliasKey> + '_ {
        self.codes
            .iter()
            .map(|code| AliasKey::Code(*code))
            .chain(self.names.iter().map(|name| AliasKey::Name(normalize_name(name))))
    }
}

/// Alias groups of one domain.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    slots: Vec<Option<Arc<AliasGroup>>>,
    index: HashMap<AliasKey, usize>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `identifiers` equivalent, merging every group they touch.
    ///
    /// The declared identifiers take priority in the order given; members of
    /// previously defined groups follow in their old order. Returns `None`
    /// for an empty declaration.
    pub fn define(&mut self, identifiers: &[Identifier]) -> Option<Arc<AliasGroup>> {
        let mut touched: Vec<usize> = Vec::new();
        for identifier in identifiers {
            if let Some(&slot) = self.index.get(&identifier.key())
                && !touched.contains(&slot)
            {
                touched.push(slot);
            }
        }

        // Names keep the spelling they were first declared with.
        let mut spelling: HashMap<AliasKey, Identifier> = HashMap::new();
        for &slot in &touched {
            if let Some(group) = &self.slots[slot] {
                for member in group.members() {
                    spelling.entry(member.key()).or_insert_with(|| member.clone());
                }
            }
        }

        let mut members: Vec<Identifier> = Vec::new();
        let mut seen: Vec<AliasKey> = Vec::new();
        let declared = identifiers.iter().map(|id| {
            spelling.get(&id.key()).cloned().unwrap_or_else(|| id.clone())
        });
        let previous = touched
            .iter()
            .filter_map(|&slot| self.slots[slot].as_ref())
            .flat_map(|group| group.members().iter().cloned())
            .collect::<Vec<_>>();
        for member in declared.chain(previous) {
            let key = member.key();
            if !seen.contains(&key) {
                seen.push(key);
                members.push(member);
            }
        }
        if members.is_empty() {
            return None;
        }

        if let &[slot] = touched.as_slice()
            && let Some(existing) = &self.slots[slot]
            && existing.members() == members.as_slice()
        {
            return Some(Arc::clone(existing));
        }

        for &slot in &touched {
            if let Some(group) = self.slots[slot].take() {
                for key in group.keys() {
                    self.index.remove(&key);
                }
            }
        }

        let mut group = AliasGroup::from_members(members);
        let index = &self.index;
        group.add_synthetic_names(|key| index.contains_key(&AliasKey::Name(key.to_string())));

        let slot = self.slots.len();
        for key in group.keys() {
            self.index.insert(key, slot);
        }
        let group = Arc::new(group);
        self.slots.push(Some(Arc::clone(&group)));
        debug!(
            codes = ?group.codes(),
            names = ?group.names(),
            merged = touched.len(),
            "defined alias group"
        );
        Some(group)
    }

    /// Group containing `identifier`, if it was ever declared.
    pub fn lookup(&self, identifier: &Identifier) -> Option<&Arc<AliasGroup>> {
        let slot = *self.index.get(&identifier.key())?;
        self.slots[slot].as_ref()
    }

    /// Group of `identifier`; undeclared identifiers form a singleton group.
    pub fn resolve(&self, identifier: &Identifier) -> Arc<AliasGroup> {
        self.lookup(identifier)
            .cloned()
            .unwrap_or_else(|| Arc::new(AliasGroup::singleton(identifier)))
    }

    pub fn code_for_name(&self, name: &str) -> Option<i64> {
        self.lookup(&Identifier::Name(name.to_string()))?
            .code_for_name(name)
    }

    pub fn name_for_code(&self, code: i64) -> Option<&str> {
        self.lookup(&Identifier::Code(code))?.name_for_code(code)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Arc<AliasGroup>> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups().count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }
}

/// Body and frame alias tables.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    body: AliasTable,
    frame: AliasTable,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, domain: AliasDomain) -> &AliasTable {
        match domain {
            AliasDomain::Body => &self.body,
            AliasDomain::Frame => &self.frame,
        }
    }

    pub fn table_mut(&mut self, domain: AliasDomain) -> &mut AliasTable {
        match domain {
            AliasDomain::Body => &mut self.body,
            AliasDomain::Frame => &mut self.frame,
        }
    }

    pub fn define(
        &mut self,
        domain: AliasDomain,
        identifiers: &[Identifier],
    ) -> Option<Arc<AliasGroup>> {
        self.table_mut(domain).define(identifiers)
    }

    pub fn resolve(&self, domain: AliasDomain, identifier: &Identifier) -> Arc<AliasGroup> {
        self.table(domain).resolve(identifier)
    }

    /// Candidates of the wanted form for an identifier, preferred first.
    pub fn candidates(
        &self,
        domain: AliasDomain,
        identifier: &Identifier,
        form: IdentifierForm,
    ) -> Vec<Identifier> {
        self.resolve(domain, identifier).candidates(form)
    }

    pub fn clear(&mut self, domain: AliasDomain) {
        self.table_mut(domain).clear();
    }

    pub fn reset(&mut self) {
        self.body.clear();
        self.frame.clear();
    }
}

/// Tries `candidates` in order until one succeeds.
///
/// Only failures for which [`DispatchError::continues_alias_search`] holds
/// move on to the next candidate; anything else is returned at once. When
/// every candidate fails, the last candidate's error is returned. On success
/// the position of the winning candidate is returned with the result.
pub fn search_candidates<T>(
    routine: &str,
    index: usize,
    candidates: &[Value],
    mut attempt: impl FnMut(&Value) -> Result<T>,
) -> Result<(T, usize)> {
    let mut last = None;
    for (position, candidate) in candidates.iter().enumerate() {
        match attempt(candidate) {
            Ok(result) => return Ok((result, position)),
            Err(err) if err.continues_alias_search() => {
                trace!(routine, index, %candidate, error = %err, "alias candidate rejected");
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last.unwrap_or_else(|| DispatchError::UnresolvedIdentifier {
        routine: routine.to_string(),
        index,
        identifier: "<no candidates>".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[Identifier]) -> Vec<Identifier> {
        items.to_vec()
    }

    #[test]
    fn members_share_one_group() {
        let mut table = AliasTable::new();
        table.define(&ids(&[553.into(), 55076.into()]));
        let a = table.resolve(&Identifier::Code(553));
        let b = table.resolve(&Identifier::Code(55076));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.codes(), &[553, 55076]);
    }

    #[test]
    fn ungrouped_identifier_resolves_to_singleton() {
        let table = AliasTable::new();
        let group = table.resolve(&Identifier::Code(399));
        assert_eq!(group.members(), &[Identifier::Code(399)]);
        assert!(table.lookup(&Identifier::Code(399)).is_none());
    }

    #[test]
    fn repeated_definition_is_a_no_op() {
        let mut table = AliasTable::new();
        let first = table
            .define(&ids(&["DIA".into(), 553.into(), 55076.into()]))
            .expect("group");
        let again = table
            .define(&ids(&["DIA".into(), 553.into(), 55076.into()]))
            .expect("group");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn new_declaration_takes_priority_and_merges_transitively() {
        let mut table = AliasTable::new();
        table.define(&ids(&[1.into(), 2.into()]));
        table.define(&ids(&[3.into(), 4.into()]));
        let merged = table
            .define(&ids(&[4.into(), 2.into()]))
            .expect("group");
        assert_eq!(merged.codes(), &[4, 2, 3, 1]);
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&merged, &table.resolve(&Identifier::Code(1))));
        assert!(Arc::ptr_eq(&merged, &table.resolve(&Identifier::Code(3))));
    }

    #[test]
    fn names_are_normalized_but_keep_original_spelling() {
        let mut table = AliasTable::new();
        table.define(&ids(&["Jupiter Barycenter".into(), 5.into()]));
        let group = table.resolve(&"  jupiter   BARYCENTER ".into());
        assert_eq!(group.names(), &["Jupiter Barycenter".to_string()]);
        assert_eq!(table.code_for_name("JUPITER BARYCENTER"), Some(5));

        let again = table
            .define(&ids(&["JUPITER BARYCENTER".into(), 5.into()]))
            .expect("group");
        assert_eq!(again.names(), &["Jupiter Barycenter".to_string()]);
    }

    #[test]
    fn surplus_codes_receive_versioned_names() {
        let mut table = AliasTable::new();
        let group = table
            .define(&ids(&["DIA".into(), 553.into(), 55076.into(), 55077.into()]))
            .expect("group");
        assert_eq!(
            group.names(),
            &["DIA".to_string(), "DIA V2".to_string(), "DIA V1".to_string()]
        );
        assert_eq!(group.synthetic_names().len(), 2);
        assert_eq!(group.name_for_code(553), Some("DIA"));
        assert_eq!(group.name_for_code(55077), Some("DIA V1"));
        assert_eq!(table.code_for_name("dia v2"), Some(55076));
        assert!(Arc::ptr_eq(&group, &table.resolve(&"DIA V1".into())));
    }

    #[test]
    fn taken_versioned_names_are_bumped() {
        let mut table = AliasTable::new();
        table.define(&ids(&["DIA V1".into(), 7.into()]));
        let group = table
            .define(&ids(&["DIA".into(), 553.into(), 55076.into(), 55077.into()]))
            .expect("group");
        assert_eq!(
            group.names(),
            &["DIA".to_string(), "DIA V2".to_string(), "DIA V3".to_string()]
        );
        assert_eq!(group.name_for_code(55076), Some("DIA V2"));
        assert_eq!(group.name_for_code(55077), Some("DIA V3"));
        assert_eq!(table.code_for_name("DIA V1"), Some(7));
        assert_eq!(table.code_for_name("DIA V3"), Some(55077));
    }

    #[test]
    fn surplus_names_map_to_preferred_code() {
        let mut table = AliasTable::new();
        table.define(&ids(&["EARTH".into(), "TERRA".into(), 399.into()]));
        assert_eq!(table.code_for_name("TERRA"), Some(399));
        assert_eq!(table.name_for_code(399), Some("EARTH"));
    }

    #[test]
    fn redefinition_regenerates_synthetic_names() {
        let mut table = AliasTable::new();
        table.define(&ids(&["DIA".into(), 553.into(), 55076.into()]));
        let group = table
            .define(&ids(&["DIA".into(), "S/2000 J11".into()]))
            .expect("group");
        assert_eq!(group.synthetic_names(), &[] as &[String]);
        assert!(table.lookup(&"DIA V1".into()).is_none());
    }

    #[test]
    fn search_stops_at_first_success() {
        let candidates = vec![Value::Int(55076), Value::Int(553)];
        let mut tried = Vec::new();
        let (result, position) = search_candidates("bodvcd", 0, &candidates, |c| {
            tried.push(c.clone());
            if *c == Value::Int(553) {
                Ok("radii")
            } else {
                Err(DispatchError::NotFound {
                    routine: "bodvcd".to_string(),
                })
            }
        })
        .expect("second candidate succeeds");
        assert_eq!(result, "radii");
        assert_eq!(position, 1);
        assert_eq!(tried, candidates);
    }

    #[test]
    fn search_propagates_other_failures_immediately() {
        let candidates = vec![Value::Int(1), Value::Int(2)];
        let mut calls = 0;
        let err = search_candidates::<()>("vsep", 0, &candidates, |_| {
            calls += 1;
            Err(DispatchError::Table("boom".to_string()))
        })
        .expect_err("fatal failure");
        assert!(matches!(err, DispatchError::Table(_)));
        assert_eq!(calls, 1);
    }
}
