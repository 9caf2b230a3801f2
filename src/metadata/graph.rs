//! Relationship lookups and join-path search over the foreign-key graph

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use super::{ForeignKeyEdge, MetadataCache, TableIdentity};
use crate::error::ScoutError;

/// Default hop bound for [`MetadataCache::join_path`]
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Upper bound on the number of paths one search returns
pub const MAX_JOIN_PATHS: usize = 10;

/// Default page size for relationship listings
pub const DEFAULT_RELATIONSHIP_LIMIT: usize = 50;

/// Which side of a foreign key the table should be on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The table references others
    Parent,
    /// Other tables reference the table
    Child,
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "child" => Ok(Self::Child),
            "both" => Ok(Self::Both),
            other => Err(ScoutError::invalid_input(format!(
                "Unknown direction '{other}' (expected parent, child or both)"
            ))),
        }
    }
}

/// Tables from start to end, connected hop by hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct JoinPath {
    tables: Vec<Arc<TableIdentity>>,
}

impl JoinPath {
    #[must_use]
    pub fn tables(&self) -> &[Arc<TableIdentity>] {
        &self.tables
    }

    /// Number of edges traversed
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.tables.len().saturating_sub(1)
    }

    /// `A -> B -> C`
    #[must_use]
    pub fn describe(&self) -> String {
        self.tables.iter().map(|t| t.full()).collect::<Vec<_>>().join(" -> ")
    }
}

/// One step of a path with the constraints that connect it
#[derive(Debug, Serialize)]
pub struct Hop<'a> {
    pub from: &'a TableIdentity,
    pub to: &'a TableIdentity,
    /// Empty when the two tables share no direct constraint
    pub edges: Vec<&'a ForeignKeyEdge>,
}

impl MetadataCache {
    /// Edges touching `table`: referencing edges first, then referenced ones
    #[must_use]
    pub fn relationships_of(
        &self,
        table: &TableIdentity,
        direction: Direction,
    ) -> Vec<&ForeignKeyEdge> {
        let mut indices: Vec<usize> = Vec::new();
        if matches!(direction, Direction::Parent | Direction::Both) {
            indices.extend(self.by_parent.get(table.full()).into_iter().flatten());
        }
        if matches!(direction, Direction::Child | Direction::Both) {
            indices.extend(self.by_child.get(table.full()).into_iter().flatten());
        }
        indices.into_iter().map(|idx| &self.edges[idx]).collect()
    }

    /// Shortest-first join paths between two tables, at most [`MAX_JOIN_PATHS`].
    ///
    /// Breadth-first over the undirected adjacency with neighbors visited in
    /// full-name order. A node is marked visited when first enqueued. Reaching
    /// `to` records a path without extending it, and no path is longer than
    /// `max_depth` edges.
    #[must_use]
    pub fn join_path(
        &self,
        from: &TableIdentity,
        to: &TableIdentity,
        max_depth: usize,
    ) -> Vec<JoinPath> {
        if from.full() == to.full() {
            let only =
                self.nodes.get(from.full()).cloned().unwrap_or_else(|| Arc::new(from.clone()));
            return vec![JoinPath { tables: vec![only] }];
        }

        let target = to.full();
        let mut found: Vec<Vec<&str>> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([from.full()]);
        let mut queue: VecDeque<Vec<&str>> = VecDeque::from([vec![from.full()]]);

        'search: while let Some(path) = queue.pop_front() {
            if path.len() > max_depth {
                continue;
            }
            let Some(&current) = path.last() else { continue };

            for neighbor in self.neighbors(current) {
                let mut next = path.clone();
                next.push(neighbor);

                if neighbor == target {
                    found.push(next);
                    if found.len() == MAX_JOIN_PATHS {
                        break 'search;
                    }
                } else if visited.insert(neighbor) {
                    queue.push_back(next);
                }
            }
        }

        found.iter().filter_map(|keys| self.lift(keys)).collect()
    }

    fn lift(&self, keys: &[&str]) -> Option<JoinPath> {
        let tables =
            keys.iter().map(|key| self.nodes.get(*key).cloned()).collect::<Option<Vec<_>>>()?;
        Some(JoinPath { tables })
    }

    /// Every edge directly connecting `a` and `b`, in either direction
    #[must_use]
    pub fn edges_between(&self, a: &TableIdentity, b: &TableIdentity) -> Vec<&ForeignKeyEdge> {
        let outgoing = |from: &TableIdentity, to: &TableIdentity| {
            self.by_parent
                .get(from.full())
                .into_iter()
                .flatten()
                .copied()
                .filter(move |idx| self.edges[*idx].child.full() == to.full())
                .collect::<Vec<_>>()
        };

        let mut indices = outgoing(a, b);
        indices.extend(outgoing(b, a));
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|idx| &self.edges[idx]).collect()
    }

    /// Pair each hop of `path` with its connecting constraints
    #[must_use]
    pub fn hops<'a>(&'a self, path: &'a JoinPath) -> Vec<Hop<'a>> {
        path.tables
            .windows(2)
            .map(|pair| Hop {
                from: &pair[0],
                to: &pair[1],
                edges: self.edges_between(&pair[0], &pair[1]),
            })
            .collect()
    }
}
