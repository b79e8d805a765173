//! Per-action measurements recorded when profiling is enabled.
//!
//! Every action runs through [`Context::measure`](crate::context::Context),
//! so the measurement tree mirrors the action tree exactly: one node per
//! executed action, children in execution order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lexical scope an action was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    Template,
    Class,
    Method,
    Field,
    Parameter,
    Signature,
    Value,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeKind::Template => "template",
            ScopeKind::Class => "class",
            ScopeKind::Method => "method",
            ScopeKind::Field => "field",
            ScopeKind::Parameter => "parameter",
            ScopeKind::Signature => "signature",
            ScopeKind::Value => "value",
        };
        f.write_str(name)
    }
}

/// One executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measurement {
    pub action: String,
    pub scope: ScopeKind,
    pub input: usize,
    pub output: usize,
    pub elapsed_micros: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Measurement>,
}

impl Measurement {
    pub(crate) fn start(action: String, scope: ScopeKind, input: usize) -> Self {
        Measurement {
            action,
            scope,
            input,
            output: 0,
            elapsed_micros: 0,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Measurement::node_count).sum::<usize>()
    }

    /// Depth-first iteration, parents before children.
    pub fn walk(&self) -> Vec<&Measurement> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    /// Time spent in this action excluding its children.
    pub fn self_micros(&self) -> u64 {
        let children: u64 = self.children.iter().map(|c| c.elapsed_micros).sum();
        self.elapsed_micros.saturating_sub(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_time_excludes_children() {
        let mut root = Measurement::start("chain".into(), ScopeKind::Template, 0);
        root.elapsed_micros = 100;
        let mut child = Measurement::start("all_classes".into(), ScopeKind::Template, 0);
        child.elapsed_micros = 60;
        root.children.push(child);

        assert_eq!(root.self_micros(), 40);
        assert_eq!(root.node_count(), 2);
        assert_eq!(root.walk()[1].action, "all_classes");
    }

    #[test]
    fn serialized_shape_skips_empty_children() {
        let node = Measurement::start("read_name".into(), ScopeKind::Value, 3);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["scope"], "value");
        assert!(json.get("children").is_none());
    }
}
