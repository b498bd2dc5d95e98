//! Result Sets

use indexmap::IndexMap;
use serde::Serialize;

use crate::graph::NodeId;
use crate::value::ArgMap;

/// Raw results of the nodes a run reports, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    entries: Vec<(NodeId, ArgMap)>,
}

impl ResultSet {
    pub(crate) fn push(&mut self, node: NodeId, result: ArgMap) {
        self.entries.push((node, result));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the first entry.
    pub fn first(&self) -> Option<&ArgMap> {
        self.entries.first().map(|(_, result)| result)
    }

    /// Value reported for `node`, if it is part of the set.
    pub fn get(&self, node: NodeId) -> Option<&ArgMap> {
        self.entries
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, result)| result)
    }

    /// Entries keyed by node id, still in completion order.
    pub fn to_map(&self) -> IndexMap<NodeId, ArgMap> {
        self.entries.iter().cloned().collect()
    }

    /// Values in completion order.
    pub fn values(&self) -> impl Iterator<Item = &ArgMap> {
        self.entries.iter().map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ArgMap)> {
        self.entries.iter().map(|(id, result)| (*id, result))
    }

    pub fn into_vec(self) -> Vec<(NodeId, ArgMap)> {
        self.entries
    }
}

impl IntoIterator for ResultSet {
    type Item = (NodeId, ArgMap);
    type IntoIter = std::vec::IntoIter<(NodeId, ArgMap)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
