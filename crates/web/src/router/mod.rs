//! Route trie.
//!
//! Routes are keyed by `(method, normalized path)`. Path segments are
//! either static text or a dynamic `{name}` binding exactly one segment.
//! Lookup prefers static children over the dynamic child at every step and
//! collects bound parameters into [`PathParams`].

use std::collections::HashMap;

use http::Method;
use thiserror::Error;

use crate::handler::Handler;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("route already exists: {method} {path}")]
    RouteExists { method: Method, path: String },

    #[error("bad path syntax: {reason}")]
    BadPathSyntax { reason: String },
}

/// Parameters bound by dynamic segments during lookup.
///
/// Values are the raw path segments; the trie does not percent-decode.
#[derive(Debug, Default, Clone)]
pub struct PathParams {
    inner: HashMap<String, String>,
}

impl PathParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn bind(&mut self, name: &str, value: &str) {
        self.inner.insert(name.to_string(), value.to_string());
    }
}

#[derive(Default)]
struct TrieNode {
    handlers: HashMap<Method, Handler>,
    static_children: HashMap<String, TrieNode>,
    dynamic_child: Option<DynamicChild>,
}

struct DynamicChild {
    param: String,
    node: Box<TrieNode>,
}

/// The route table. Read-only after server start.
#[derive(Default)]
pub struct RouteTrie {
    root: TrieNode,
}

impl RouteTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(method, path)`.
    ///
    /// Dynamic segments extend or reuse the node's single dynamic child.
    /// Reusing it under a different parameter name is allowed: the
    /// first-registered name stays authoritative for every route through
    /// that child.
    pub fn insert(&mut self, method: Method, path: &str, handler: Handler) -> Result<(), RouterError> {
        let normalized = normalize_path(path);
        let segments = split_path(&normalized);

        let mut node = &mut self.root;

        for segment in segments {
            if segment.is_empty() {
                return Err(RouterError::BadPathSyntax { reason: format!("empty segment in path: {normalized}") });
            }

            if is_broken_segment(segment) {
                return Err(RouterError::BadPathSyntax { reason: format!("malformed dynamic segment: {segment}") });
            }

            if is_dynamic_segment(segment) {
                let param = &segment[1..segment.len() - 1];
                if param.is_empty() {
                    return Err(RouterError::BadPathSyntax {
                        reason: format!("dynamic segment without name: {normalized}"),
                    });
                }

                let child = node.dynamic_child.get_or_insert_with(|| DynamicChild {
                    param: param.to_string(),
                    node: Box::new(TrieNode::default()),
                });
                node = &mut child.node;
            } else {
                node = node.static_children.entry(segment.to_string()).or_default();
            }
        }

        if node.handlers.contains_key(&method) {
            return Err(RouterError::RouteExists { method, path: normalized });
        }

        node.handlers.insert(method, handler);
        Ok(())
    }

    /// Looks up the handler for `(method, path)`, binding dynamic
    /// parameters along the way.
    ///
    /// Static children win over the dynamic child. An empty mid-path
    /// segment (`a//b`) never matches.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Handler, PathParams)> {
        let normalized = normalize_path(path);
        let segments = split_path(&normalized);

        let mut node = &self.root;
        let mut params = PathParams::empty();

        for segment in segments {
            if segment.is_empty() {
                return None;
            }

            if let Some(child) = node.static_children.get(segment) {
                node = child;
            } else if let Some(dynamic) = &node.dynamic_child {
                params.bind(&dynamic.param, segment);
                node = &dynamic.node;
            } else {
                return None;
            }
        }

        node.handlers.get(method).map(|handler| (handler, params))
    }
}

/// Strips the trailing slash except for the root; an empty path is the root.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    if path == "/" {
        return Vec::new();
    }

    path.trim_start_matches('/').split('/').collect()
}

fn is_dynamic_segment(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}

fn is_broken_segment(segment: &str) -> bool {
    (segment.starts_with('{') && !segment.ends_with('}')) || (!segment.starts_with('{') && segment.ends_with('}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpContext;
    use crate::handler;
    use oxapi_http::protocol::Response;

    fn tagged(tag: &'static str) -> Handler {
        handler::sync(move |_ctx: HttpContext| Response::text(tag))
    }

    fn assert_no_params(params: &PathParams) {
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn insert_then_find() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/users", tagged("users")).unwrap();

        let (_, params) = trie.find(&Method::GET, "/users").unwrap();
        assert_no_params(&params);

        assert!(trie.find(&Method::POST, "/users").is_none());
        assert!(trie.find(&Method::GET, "/users/extra").is_none());
    }

    #[test]
    fn trailing_slash_matches() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/users", tagged("users")).unwrap();

        assert!(trie.find(&Method::GET, "/users/").is_some());
        assert!(trie.find(&Method::GET, "/users").is_some());
    }

    #[test]
    fn root_path_forms() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/", tagged("root")).unwrap();

        assert!(trie.find(&Method::GET, "/").is_some());
        assert!(trie.find(&Method::GET, "").is_some());
    }

    #[test]
    fn dynamic_segments_bind_params() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/user/{id}/post/{pid}", tagged("post")).unwrap();

        let (_, params) = trie.find(&Method::GET, "/user/42/post/hello").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("pid"), Some("hello"));

        assert!(trie.find(&Method::GET, "/user/42/post").is_none());
        assert!(trie.find(&Method::GET, "/user/42/post/hello/more").is_none());
    }

    #[test]
    fn static_child_wins_over_dynamic() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/a/static", tagged("static")).unwrap();
        trie.insert(Method::GET, "/a/{x}", tagged("dynamic")).unwrap();

        let (handler, params) = trie.find(&Method::GET, "/a/static").unwrap();
        assert!(!handler.is_async());
        assert_no_params(&params);

        let (_, params) = trie.find(&Method::GET, "/a/other").unwrap();
        assert_eq!(params.get("x"), Some("other"));
    }

    #[test]
    fn raw_segments_are_not_decoded() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/file/{name}", tagged("file")).unwrap();

        let (_, params) = trie.find(&Method::GET, "/file/a%20b").unwrap();
        assert_eq!(params.get("name"), Some("a%20b"));
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/dup", tagged("one")).unwrap();

        let err = trie.insert(Method::GET, "/dup/", tagged("two")).unwrap_err();
        assert!(matches!(err, RouterError::RouteExists { .. }));

        // a different method at the same node is fine
        trie.insert(Method::POST, "/dup", tagged("post")).unwrap();
    }

    #[test]
    fn broken_segments_are_syntax_errors() {
        let mut trie = RouteTrie::new();

        for path in ["/a/{x", "/a/x}", "/a/{}"] {
            let err = trie.insert(Method::GET, path, tagged("x")).unwrap_err();
            assert!(matches!(err, RouterError::BadPathSyntax { .. }), "path {path} should be rejected");
        }
    }

    #[test]
    fn first_param_name_is_authoritative() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/x/{a}", tagged("get")).unwrap();
        trie.insert(Method::POST, "/x/{b}", tagged("post")).unwrap();

        let (_, params) = trie.find(&Method::POST, "/x/7").unwrap();
        assert_eq!(params.get("a"), Some("7"));
        assert_eq!(params.get("b"), None);
    }

    #[test]
    fn empty_mid_segment_never_matches() {
        let mut trie = RouteTrie::new();
        trie.insert(Method::GET, "/a/b", tagged("ab")).unwrap();

        assert!(trie.find(&Method::GET, "/a//b").is_none());
    }
}
