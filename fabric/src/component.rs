// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component identity.
//!
//! Every event-handling entity carries a [`Scope`], a node in the
//! hierarchical name tree used for logging and lookup. Parents own their
//! children; a scope only holds the non-owning name chain upward.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// An event-handling entity.
///
/// `process_event` receives ownership of the payload that was handed to
/// the scheduler at insert time. Implementations must treat an
/// unrecognized `kind` as fatal.
pub trait Component {
    fn scope(&self) -> &Scope;
    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32);
}

struct ScopeNode {
    label: String,
    parent: Option<Scope>,
}

/// A node in the hierarchical component name tree.
#[derive(Clone)]
pub struct Scope {
    node: Rc<ScopeNode>,
}

impl Scope {
    pub fn root(label: impl Into<String>) -> Self {
        Self {
            node: Rc::new(ScopeNode {
                label: label.into(),
                parent: None,
            }),
        }
    }

    pub fn child(&self, label: impl Into<String>) -> Self {
        Self {
            node: Rc::new(ScopeNode {
                label: label.into(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// The leaf label of this scope.
    pub fn label(&self) -> &str {
        &self.node.label
    }

    /// The full dotted path from the root.
    pub fn path(&self) -> String {
        match &self.node.parent {
            Some(parent) => format!("{}.{}", parent.path(), self.node.label),
            None => self.node.label.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Scope({})", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_chain_from_root() {
        let top = Scope::root("sim");
        let app = top.child("application_0");
        let terminal = app.child("terminal_3");

        assert_eq!(top.path(), "sim");
        assert_eq!(app.path(), "sim.application_0");
        assert_eq!(terminal.path(), "sim.application_0.terminal_3");
        assert_eq!(terminal.label(), "terminal_3");
    }

    #[test]
    fn siblings_share_the_parent_chain() {
        let top = Scope::root("sim");
        let a = top.child("a");
        let b = top.child("b");
        assert_eq!(a.path(), "sim.a");
        assert_eq!(b.path(), "sim.b");
        assert_eq!(format!("{}", b), "sim.b");
    }
}
