//! Structural routing of dotted method paths.
//!
//! Bassbox groups its methods into services (`audioPlayer`, `audioGraph`).
//! A [`Namespace`] turns nested name access into a single qualified method
//! name by string concatenation, so no table of known methods is needed:
//!
//! ```text
//! root.get("audioPlayer")  -> Member::Scope   (prefix "audioPlayer")
//!     .get("play")         -> Member::Method  ("audioPlayer.play")
//! root.get("ping")         -> Member::Method  ("ping")
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::ipc::client::{RpcClient, RpcError};

/// Result of looking up a name inside a [`Namespace`].
#[derive(Clone)]
pub enum Member {
    /// The name is a declared scope; extend the path further.
    Scope(Namespace),
    /// Any other name is a callable method.
    Method(RemoteMethod),
}

/// A node of the remote method tree, bound to a dotted path prefix.
#[derive(Clone)]
pub struct Namespace {
    client: RpcClient,
    scopes: Arc<BTreeSet<String>>,
    prefix: String,
}

impl Namespace {
    /// Root namespace over `client` with the given declared scope names.
    pub fn root<I, S>(client: RpcClient, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            scopes: Arc::new(scopes.into_iter().map(Into::into).collect()),
            prefix: String::new(),
        }
    }

    /// Dotted path of this namespace; empty at the root.
    pub fn path(&self) -> &str {
        &self.prefix
    }

    pub fn is_scope(&self, name: &str) -> bool {
        self.scopes.contains(name)
    }

    fn qualify(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    /// Look up `name` one level below this namespace.
    ///
    /// Declared scope names yield a nested namespace at any depth; every
    /// other name yields a method.
    pub fn get(&self, name: &str) -> Member {
        let path = self.qualify(name);
        if self.is_scope(name) {
            Member::Scope(Namespace {
                client: self.client.clone(),
                scopes: Arc::clone(&self.scopes),
                prefix: path,
            })
        } else {
            Member::Method(RemoteMethod {
                client: self.client.clone(),
                name: path,
            })
        }
    }

    /// Nested namespace for `name`, if it is a declared scope.
    pub fn scope(&self, name: &str) -> Option<Namespace> {
        match self.get(name) {
            Member::Scope(scope) => Some(scope),
            Member::Method(_) => None,
        }
    }

    /// Walk a dotted path (`"audioPlayer.play"`) one segment at a time.
    pub fn resolve(&self, path: &str) -> Member {
        let mut segments = path.split('.');
        // split always yields at least one segment
        let mut member = self.get(segments.next().unwrap_or_default());
        for segment in segments {
            member = match member {
                Member::Scope(scope) => scope.get(segment),
                Member::Method(method) => Member::Method(method.child(segment)),
            };
        }
        member
    }

    /// Call `name` below this namespace.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::NotCallable` if `name` is a declared scope, plus
    /// every error of [`RpcClient::call`].
    pub async fn call(&self, name: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        match self.get(name) {
            Member::Method(method) => method.call(params).await,
            Member::Scope(scope) => Err(RpcError::NotCallable(scope.prefix)),
        }
    }

    /// Call the method at a dotted path below this namespace.
    pub async fn call_path(&self, path: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        match self.resolve(path) {
            Member::Method(method) => method.call(params).await,
            Member::Scope(scope) => Err(RpcError::NotCallable(scope.prefix)),
        }
    }
}

/// A callable bound to a fully qualified method name.
#[derive(Clone)]
pub struct RemoteMethod {
    client: RpcClient,
    name: String,
}

impl RemoteMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn child(self, segment: &str) -> RemoteMethod {
        RemoteMethod {
            name: format!("{}.{}", self.name, segment),
            client: self.client,
        }
    }

    pub async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        self.client.call(&self.name, params).await
    }
}
