//! Middleware groups
//!
//! Groups form a tree rooted at the engine. Each group owns an ordered list
//! of middleware; a method registered in a group is wrapped in that group's
//! middleware first (innermost), then in each ancestor's, so the root's
//! middleware always sees a call first and its result last.
//!
//! Groups live in an arena owned by the [`Engine`](crate::Engine) and are
//! addressed by [`GroupId`]; parent links are plain indices.

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::ConfigError;
use crate::method::MethodHandler;
use crate::middleware::{Middleware, Next, apply_layers};

/// Handle to a group inside one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

impl GroupId {
    /// The engine's root group
    pub const ROOT: GroupId = GroupId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

struct GroupNode {
    parent: Option<GroupId>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Arena of groups; index 0 is the root
pub(crate) struct GroupTree {
    nodes: Vec<GroupNode>,
}

impl GroupTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![GroupNode {
                parent: None,
                middleware: Vec::new(),
            }],
        }
    }

    fn node(&self, id: GroupId) -> Result<&GroupNode, ConfigError> {
        self.nodes.get(id.0).ok_or(ConfigError::UnknownGroup(id.0))
    }

    pub(crate) fn add_child(&mut self, parent: GroupId) -> Result<GroupId, ConfigError> {
        self.node(parent)?;
        self.nodes.push(GroupNode {
            parent: Some(parent),
            middleware: Vec::new(),
        });
        Ok(GroupId(self.nodes.len() - 1))
    }

    pub(crate) fn push_middleware(
        &mut self,
        group: GroupId,
        layer: Arc<dyn Middleware>,
    ) -> Result<(), ConfigError> {
        let node = self
            .nodes
            .get_mut(group.0)
            .ok_or(ConfigError::UnknownGroup(group.0))?;
        node.middleware.push(layer);
        Ok(())
    }

    /// Wrap `raw` in the middleware of `group` and all of its ancestors
    pub(crate) fn compose(&self, group: GroupId, raw: Next) -> Result<Next, ConfigError> {
        let mut next = raw;
        let mut current = Some(group);
        while let Some(id) = current {
            let node = self.node(id)?;
            next = apply_layers(next, &node.middleware);
            current = node.parent;
        }
        Ok(next)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Registration view of one group
///
/// ```rust
/// use rpc_dispatch::{Engine, RequestContext, RpcError};
///
/// async fn whoami(ctx: RequestContext) -> Result<String, RpcError> {
///     Ok(ctx.method().to_string())
/// }
///
/// let mut engine = Engine::new();
/// let admin = engine.group();
/// engine.scope(admin).register("Admin.WhoAmI", whoami);
/// assert!(engine.has_method("Admin.WhoAmI"));
/// ```
pub struct Scope<'a> {
    engine: &'a mut Engine,
    group: GroupId,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(engine: &'a mut Engine, group: GroupId) -> Self {
        Self { engine, group }
    }

    pub fn id(&self) -> GroupId {
        self.group
    }

    /// Create a child group inheriting this group's middleware
    pub fn group(&mut self) -> GroupId {
        match self.engine.try_group_in(self.group) {
            Ok(id) => id,
            Err(err) => panic!("rpc-dispatch: {}", err),
        }
    }

    /// Add middleware to this group. Panics if any method is registered.
    pub fn use_middleware(&mut self, layer: impl Middleware) -> &mut Self {
        if let Err(err) = self.try_use_middleware(layer) {
            panic!("rpc-dispatch: {}", err);
        }
        self
    }

    pub fn try_use_middleware(&mut self, layer: impl Middleware) -> Result<(), ConfigError> {
        self.engine.try_use_middleware_in(self.group, layer)
    }

    /// Register a method in this group. Panics on a duplicate name.
    pub fn register<Args, H>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: MethodHandler<Args>,
    {
        if let Err(err) = self.try_register(name, handler) {
            panic!("rpc-dispatch: {}", err);
        }
        self
    }

    pub fn try_register<Args, H>(&mut self, name: &str, handler: H) -> Result<(), ConfigError>
    where
        H: MethodHandler<Args>,
    {
        self.engine.try_register_in(self.group, name, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::error::BoxError;
    use crate::middleware::{Params, from_fn};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(from_fn(move |ctx, params, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("enter {tag}"));
                let result = next.run(ctx, params).await;
                log.lock().unwrap().push(format!("leave {tag}"));
                result
            }
        }))
    }

    #[tokio::test]
    async fn test_compose_child_inside_parent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = GroupTree::new();
        let child = tree.add_child(GroupId::ROOT).unwrap();
        let grandchild = tree.add_child(child).unwrap();

        tree.push_middleware(GroupId::ROOT, tagging("root", Arc::clone(&log)))
            .unwrap();
        tree.push_middleware(child, tagging("child-1", Arc::clone(&log)))
            .unwrap();
        tree.push_middleware(child, tagging("child-2", Arc::clone(&log)))
            .unwrap();
        tree.push_middleware(grandchild, tagging("leaf", Arc::clone(&log)))
            .unwrap();

        let raw = Next::new(|_ctx, _params| async { Ok::<Value, BoxError>(json!(null)) });
        let pipeline = tree.compose(grandchild, raw).unwrap();
        pipeline
            .run(RequestContext::from_method("m"), Params::none())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "enter root",
                "enter child-1",
                "enter child-2",
                "enter leaf",
                "leave leaf",
                "leave child-2",
                "leave child-1",
                "leave root",
            ]
        );
    }

    #[test]
    fn test_unknown_group() {
        let mut tree = GroupTree::new();
        assert_eq!(
            tree.add_child(GroupId(3)).unwrap_err(),
            ConfigError::UnknownGroup(3)
        );
        assert_eq!(tree.len(), 1);
    }
}
