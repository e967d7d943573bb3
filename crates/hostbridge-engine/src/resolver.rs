//! Overload resolution
//!
//! Given a declaring type, a member name and the caller's ordered argument
//! tags, pick the one method the caller means. Matching is strict: every
//! parameter's semantic tag must equal the caller's tag at that position,
//! and the first such candidate in declaration order wins (derived types
//! before their bases).
//!
//! A caller that already knows the exact overload can pass its rendered
//! signature (e.g. `Int32 Compute(Int32)`) as the name to skip matching.

use std::fmt;

use hostbridge_sdk::{BindingScope, ManagedType, MemberRef, MethodRef, TypeRef, TypeSystemProvider};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{error, trace};

/// Memoization key for a resolved member
///
/// Keyed by type name, so two modules declaring the same full name share an
/// entry; `MemberResolver::resolve` checks a hit against the concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    /// Full name of the declaring type
    pub type_name: String,
    /// Requested member name
    pub name: String,
    /// Caller's parameter tags
    pub tags: Vec<ManagedType>,
    /// Binding scope the lookup ran under
    pub scope: BindingScope,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.type_name, self.name, TagList(&self.tags))
    }
}

struct TagList<'a>(&'a [ManagedType]);

impl fmt::Display for TagList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", tag)?;
        }
        Ok(())
    }
}

/// Errors from overload resolution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// No candidate matched name, arity and every tag
    #[error("No suitable {scope:?} member for {key}; candidates: [{}]", .candidates.join("; "))]
    NoSuitableMember {
        /// The requested lookup
        key: MethodKey,
        /// Binding scope searched
        scope: BindingScope,
        /// Signatures of every same-named candidate
        candidates: Vec<String>,
    },
}

/// Semantic tag a parameter of type `ty` matches against
pub fn semantic_tag(provider: &dyn TypeSystemProvider, ty: &TypeRef) -> ManagedType {
    provider.type_kind(ty).managed_type()
}

/// Every method visible from `ty` under `scope`, most-derived first
pub fn candidates(
    provider: &dyn TypeSystemProvider,
    ty: &TypeRef,
    scope: BindingScope,
) -> Vec<MethodRef> {
    if scope == BindingScope::Constructor {
        return provider.constructors(ty);
    }

    let want_static = scope == BindingScope::Static;
    let mut methods = Vec::new();
    let mut current = Some(ty.clone());
    while let Some(t) = current {
        methods.extend(
            provider
                .methods(&t)
                .into_iter()
                .filter(|m| provider.is_static(MemberRef::Method(m)) == want_static),
        );
        current = provider.base_type(&t);
    }
    methods
}

/// Resolves member names and tag signatures to method descriptors
pub struct MemberResolver {
    memo: FxHashMap<MethodKey, MethodRef>,
    memoize: bool,
}

impl MemberResolver {
    /// Create a resolver; `memoize` enables the method-key memo
    pub fn new(memoize: bool) -> Self {
        Self {
            memo: FxHashMap::default(),
            memoize,
        }
    }

    /// Resolve `name` on `ty` for arguments tagged `tags`
    pub fn resolve(
        &mut self,
        provider: &dyn TypeSystemProvider,
        ty: &TypeRef,
        name: &str,
        tags: &[ManagedType],
        scope: BindingScope,
    ) -> Result<MethodRef, ResolveError> {
        let key = MethodKey {
            type_name: provider.full_name(ty),
            name: name.to_string(),
            tags: tags.to_vec(),
            scope,
        };
        // Full names are not unique across modules, so a hit only counts if
        // the memoized method is still visible from this exact type.
        if let Some(method) = self.memo.get(&key) {
            if candidates(provider, ty, scope).contains(method) {
                trace!(%key, "resolution memo hit");
                return Ok(method.clone());
            }
            trace!(%key, "memoized method belongs to another type, resolving again");
        }

        let method = find_suitable(provider, ty, &key)?;
        if self.memoize {
            self.memo.insert(key, method.clone());
        }
        Ok(method)
    }

    /// Forget every memoized resolution
    pub fn invalidate(&mut self) {
        self.memo.clear();
    }

    /// Number of memoized resolutions
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}

impl Default for MemberResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

fn find_suitable(
    provider: &dyn TypeSystemProvider,
    ty: &TypeRef,
    key: &MethodKey,
) -> Result<MethodRef, ResolveError> {
    let all = candidates(provider, ty, key.scope);

    if let Some(exact) = all
        .iter()
        .find(|m| provider.method_signature(m) == key.name)
    {
        trace!(%key, "resolved by exact signature");
        return Ok(exact.clone());
    }

    let named: Vec<&MethodRef> = all
        .iter()
        .filter(|m| {
            key.scope == BindingScope::Constructor
                || provider.member_name(MemberRef::Method(m)) == key.name
        })
        .collect();

    let found = named.iter().find(|m| {
        let params = provider.method_parameters(m);
        params.len() == key.tags.len()
            && params
                .iter()
                .zip(&key.tags)
                .all(|(param, &tag)| semantic_tag(provider, param) == tag)
    });
    if let Some(method) = found {
        return Ok((*method).clone());
    }

    let candidates: Vec<String> = named.iter().map(|m| provider.method_signature(m)).collect();
    error!(%key, scope = ?key.scope, "no suitable member found");
    for signature in &candidates {
        error!("  candidate: {}", signature);
    }
    Err(ResolveError::NoSuitableMember {
        key: key.clone(),
        scope: key.scope,
        candidates,
    })
}
