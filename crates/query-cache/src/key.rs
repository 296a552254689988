//! Query identity for result caching
//!
//! A [`QueryKey`] identifies one cacheable invocation: the compiled query that
//! ran plus the parameter values it ran with. Keys are built fresh for every
//! lookup and never mutated.

use ahash::AHasher;
use query_core::{QueryError, Result, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_COMPILED_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a compiled query. Two ids are equal iff they name the
/// same compiled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompiledQueryId(u64);

impl CompiledQueryId {
    /// Allocate a process-unique id for a freshly compiled query
    pub fn next() -> Self {
        Self(NEXT_COMPILED_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an id assigned by the compiler
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CompiledQueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// How parameters are addressed by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingMode {
    Positional,
    Named,
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingMode::Positional => write!(f, "positional"),
            BindingMode::Named => write!(f, "named"),
        }
    }
}

/// A parameter slot: `?1` style position or `:name` style name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamSlot {
    Position(usize),
    Named(String),
}

impl ParamSlot {
    pub fn named(name: impl Into<String>) -> Self {
        ParamSlot::Named(name.into())
    }

    pub fn mode(&self) -> BindingMode {
        match self {
            ParamSlot::Position(_) => BindingMode::Positional,
            ParamSlot::Named(_) => BindingMode::Named,
        }
    }
}

impl fmt::Display for ParamSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSlot::Position(pos) => write!(f, "?{}", pos),
            ParamSlot::Named(name) => write!(f, ":{}", name),
        }
    }
}

/// Values bound to the parameters of one invocation
///
/// A binding set is either positional or named, never both. A slot missing
/// from the set is unbound, which is different from a slot bound to
/// [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterBindings {
    mode: BindingMode,
    values: BTreeMap<ParamSlot, Value>,
}

impl ParameterBindings {
    /// Create an empty positional binding set
    pub fn positional() -> Self {
        Self {
            mode: BindingMode::Positional,
            values: BTreeMap::new(),
        }
    }

    /// Create an empty named binding set
    pub fn named() -> Self {
        Self {
            mode: BindingMode::Named,
            values: BTreeMap::new(),
        }
    }

    /// Bind values to positions `1..=n` in order
    pub fn positional_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (ParamSlot::Position(i + 1), v.into()))
            .collect();
        Self {
            mode: BindingMode::Positional,
            values,
        }
    }

    /// Bind values by name
    pub fn named_values<I, N, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|(n, v)| (ParamSlot::Named(n.into()), v.into()))
            .collect();
        Self {
            mode: BindingMode::Named,
            values,
        }
    }

    /// Bind a value to a slot, replacing any earlier value.
    ///
    /// Fails if the slot does not match the binding mode of this set.
    pub fn bind(&mut self, slot: ParamSlot, value: impl Into<Value>) -> Result<()> {
        if slot.mode() != self.mode {
            return Err(QueryError::BindingModeMismatch {
                expected: self.mode.to_string(),
                found: slot.mode().to_string(),
            });
        }
        self.values.insert(slot, value.into());
        Ok(())
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    pub fn get(&self, slot: &ParamSlot) -> Option<&Value> {
        self.values.get(slot)
    }

    pub fn is_bound(&self, slot: &ParamSlot) -> bool {
        self.values.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamSlot, &Value)> {
        self.values.iter()
    }
}

/// A compiled query as seen by the cache: an identity plus the parameters it
/// cannot run without.
pub trait CompiledQuery {
    fn compiled_id(&self) -> CompiledQueryId;

    fn required_parameters(&self) -> &[ParamSlot];
}

/// Canonical identity of one cacheable invocation
#[derive(Debug, Clone)]
pub struct QueryKey {
    query: CompiledQueryId,
    bindings: ParameterBindings,
    fingerprint: u64,
}

impl QueryKey {
    /// Derive the key for running `query` with `bindings`.
    ///
    /// Every required parameter of the query must be bound, possibly to
    /// `Value::Null`.
    pub fn derive(query: &dyn CompiledQuery, bindings: &ParameterBindings) -> Result<Self> {
        if let Some(missing) = query
            .required_parameters()
            .iter()
            .find(|slot| !bindings.is_bound(slot))
        {
            return Err(QueryError::UnboundParameter(missing.to_string()));
        }

        let id = query.compiled_id();
        let mut hasher = AHasher::default();
        id.hash(&mut hasher);
        bindings.hash(&mut hasher);

        Ok(Self {
            query: id,
            bindings: bindings.clone(),
            fingerprint: hasher.finish(),
        })
    }

    pub fn compiled_id(&self) -> CompiledQueryId {
        self.query
    }

    pub fn bindings(&self) -> &ParameterBindings {
        &self.bindings
    }

    pub fn mode(&self) -> BindingMode {
        self.bindings.mode
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.query == other.query
            && self.bindings == other.bindings
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.query)?;
        for (i, (slot, value)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", slot, value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    pub(crate) struct TestQuery {
        pub id: CompiledQueryId,
        pub required: Vec<ParamSlot>,
    }

    impl TestQuery {
        pub fn new(required: Vec<ParamSlot>) -> Self {
            Self {
                id: CompiledQueryId::next(),
                required,
            }
        }
    }

    impl CompiledQuery for TestQuery {
        fn compiled_id(&self) -> CompiledQueryId {
            self.id
        }

        fn required_parameters(&self) -> &[ParamSlot] {
            &self.required
        }
    }

    fn hash_of(key: &QueryKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_bindings_equal_keys() {
        let query = TestQuery::new(vec![ParamSlot::named("name")]);
        let k1 = QueryKey::derive(&query, &ParameterBindings::named_values([("name", "alice")]))
            .unwrap();
        let k2 = QueryKey::derive(&query, &ParameterBindings::named_values([("name", "alice")]))
            .unwrap();

        assert_eq!(k1, k2);
        assert_eq!(hash_of(&k1), hash_of(&k2));
    }

    #[test]
    fn test_different_query_different_keys() {
        let q1 = TestQuery::new(vec![]);
        let q2 = TestQuery::new(vec![]);
        let bindings = ParameterBindings::positional_values([1i64, 2]);

        let k1 = QueryKey::derive(&q1, &bindings).unwrap();
        let k2 = QueryKey::derive(&q2, &bindings).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_different_values_different_keys() {
        let query = TestQuery::new(vec![ParamSlot::Position(1)]);
        let k1 = QueryKey::derive(&query, &ParameterBindings::positional_values([1i64])).unwrap();
        let k2 = QueryKey::derive(&query, &ParameterBindings::positional_values([2i64])).unwrap();
        let k3 = QueryKey::derive(&query, &ParameterBindings::positional_values([1.0f64])).unwrap();

        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_null_differs_from_unbound() {
        let query = TestQuery::new(vec![]);
        let mut with_null = ParameterBindings::named();
        with_null.bind(ParamSlot::named("owner"), Value::Null).unwrap();
        let unbound = ParameterBindings::named();

        let k1 = QueryKey::derive(&query, &with_null).unwrap();
        let k2 = QueryKey::derive(&query, &unbound).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_null_satisfies_required_parameter() {
        let query = TestQuery::new(vec![ParamSlot::named("owner")]);
        let mut bindings = ParameterBindings::named();
        bindings.bind(ParamSlot::named("owner"), Value::Null).unwrap();

        assert!(QueryKey::derive(&query, &bindings).is_ok());
    }

    #[test]
    fn test_positional_never_equals_named() {
        let query = TestQuery::new(vec![]);
        let positional = ParameterBindings::positional();
        let named = ParameterBindings::named();

        let k1 = QueryKey::derive(&query, &positional).unwrap();
        let k2 = QueryKey::derive(&query, &named).unwrap();
        assert_ne!(k1, k2);
        assert_eq!(k1.mode(), BindingMode::Positional);
        assert_eq!(k2.mode(), BindingMode::Named);
    }

    #[test]
    fn test_unbound_required_parameter_is_an_error() {
        let query = TestQuery::new(vec![ParamSlot::Position(1), ParamSlot::Position(2)]);
        let bindings = ParameterBindings::positional_values([10i64]);

        let err = QueryKey::derive(&query, &bindings).unwrap_err();
        assert_eq!(err, QueryError::UnboundParameter("?2".to_string()));
    }

    #[test]
    fn test_bind_rejects_mode_mismatch() {
        let mut bindings = ParameterBindings::positional();
        let err = bindings.bind(ParamSlot::named("x"), 1i64).unwrap_err();
        assert!(matches!(err, QueryError::BindingModeMismatch { .. }));
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_key_display() {
        let query = TestQuery::new(vec![]);
        let key = QueryKey::derive(&query, &ParameterBindings::named_values([("id", 5i64)]))
            .unwrap();
        assert_eq!(key.to_string(), format!("{}(:id=5)", query.id));
    }
}
