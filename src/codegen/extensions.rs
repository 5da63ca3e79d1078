/*!
 * Extension Functions
 *
 * Whitelist of external functions callable from expressions. Arguments
 * and results travel in the slot domain with C-compatible scalar
 * signatures; composite results occupy multiple slots on the caller's
 * side and are out of scope for the scalar registry.
 */

use crate::core::types::TypeDesc;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

/// Most slot arguments an extension function may take
pub const MAX_EXTENSION_ARGS: usize = 8;

/// A registered scalar extension function
#[derive(Clone)]
pub struct ExtensionFn {
    pub name: String,
    pub arg_types: Vec<TypeDesc>,
    pub ret_type: TypeDesc,
    pub body: Arc<dyn Fn(&[i64]) -> i64 + Send + Sync>,
}

/// The whitelist consulted during lowering. Unregistered names fail
/// compilation, never execution.
pub struct ExtensionFnRegistry {
    functions: DashMap<String, ExtensionFn, RandomState>,
}

impl ExtensionFnRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Whitelist a function under its name
    pub fn register(
        &self,
        name: impl Into<String>,
        arg_types: Vec<TypeDesc>,
        ret_type: TypeDesc,
        body: Arc<dyn Fn(&[i64]) -> i64 + Send + Sync>,
    ) {
        assert!(
            arg_types.len() <= MAX_EXTENSION_ARGS,
            "extension functions take at most {MAX_EXTENSION_ARGS} arguments"
        );
        let name = name.into();
        self.functions.insert(
            name.clone(),
            ExtensionFn {
                name,
                arg_types,
                ret_type,
                body,
            },
        );
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ExtensionFn> {
        self.functions.get(name).map(|f| f.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for ExtensionFnRegistry {
    fn default() -> Self {
        Self::new()
    }
}
