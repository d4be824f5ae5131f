//! Load ordering from foreign-key dependencies.
//!
//! Tables form a directed graph with an edge from every referenced table to
//! each table that references it. A topological order of that graph is a
//! referenced-first load order. Ties are broken by table name so the order
//! is the same on every run, whatever order the definitions were read in.

use crate::error::{Result, TvalError};
use crate::schema::TableDefinition;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

/// Computes a referenced-first order for a set of table definitions.
pub struct DependencyResolver<'a> {
    tables: HashMap<&'a str, &'a TableDefinition>,
    graph: DiGraphMap<&'a str, ()>,
}

impl<'a> DependencyResolver<'a> {
    /// Builds the dependency graph.
    ///
    /// Fails with [`TvalError::UnknownReference`] when a foreign key targets
    /// a table that is not among `tables`. A foreign key from a table to
    /// itself does not constrain the order and is left out of the graph.
    pub fn new(tables: &'a [TableDefinition]) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tables.len());
        let mut graph = DiGraphMap::new();

        for table in tables {
            if by_name.insert(table.name.as_str(), table).is_some() {
                return Err(TvalError::invalid_definition(
                    &table.name,
                    "table name is defined more than once",
                ));
            }
            graph.add_node(table.name.as_str());
        }

        for table in tables {
            for target in table.referenced_tables() {
                if !by_name.contains_key(target) {
                    return Err(TvalError::UnknownReference {
                        table: table.name.clone(),
                        target: target.to_string(),
                    });
                }
                if target != table.name {
                    graph.add_edge(target, table.name.as_str(), ());
                }
            }
        }

        Ok(Self {
            tables: by_name,
            graph,
        })
    }

    /// Returns the tables in load order.
    #[instrument(skip(self), fields(tables = self.tables.len()))]
    pub fn load_order(&self) -> Result<Vec<&'a TableDefinition>> {
        let mut in_degree: HashMap<&str, usize> = self
            .graph
            .nodes()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.tables.len());
        while let Some(name) = ready.pop_first() {
            order.push(name);
            for dependent in self.graph.neighbors_directed(name, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < self.tables.len() {
            return Err(TvalError::CyclicDependency {
                tables: self.cycle_members(),
            });
        }

        debug!(order = ?order, "Resolved load order");
        Ok(order
            .into_iter()
            .filter_map(|name| self.tables.get(name).copied())
            .collect())
    }

    /// Tables on at least one cycle, sorted by name.
    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .map(str::to_string)
            .collect();
        members.sort();
        members
    }
}

/// Convenience wrapper: builds the graph and returns the load order.
pub fn resolve_load_order(tables: &[TableDefinition]) -> Result<Vec<&TableDefinition>> {
    DependencyResolver::new(tables)?.load_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDefinition, ForeignKey};
    use proptest::prelude::*;

    fn table(name: &str, refs: &[&str]) -> TableDefinition {
        let mut def = TableDefinition::new(name, vec![ColumnDefinition::new("id", "BIGINT")]);
        for target in refs {
            def = def.with_foreign_key(ForeignKey::new(["id"], *target, ["id"]));
        }
        def
    }

    fn names(order: &[&TableDefinition]) -> Vec<String> {
        order.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_chain_orders_referenced_first() {
        let tables = vec![
            table("items", &["orders"]),
            table("orders", &["users"]),
            table("users", &[]),
        ];
        let order = resolve_load_order(&tables).unwrap();
        assert_eq!(names(&order), vec!["users", "orders", "items"]);
    }

    #[test]
    fn test_independent_tables_sorted_by_name() {
        let tables = vec![table("zeta", &[]), table("alpha", &[]), table("mid", &[])];
        let order = resolve_load_order(&tables).unwrap();
        assert_eq!(names(&order), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_two_table_cycle() {
        let tables = vec![table("a", &["b"]), table("b", &["a"])];
        let err = resolve_load_order(&tables).unwrap_err();
        match err {
            TvalError::CyclicDependency { tables } => assert_eq!(tables, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_excludes_downstream_tables() {
        let tables = vec![
            table("a", &["b"]),
            table("b", &["a"]),
            table("c", &["a"]),
            table("d", &[]),
        ];
        match resolve_load_order(&tables).unwrap_err() {
            TvalError::CyclicDependency { tables } => assert_eq!(tables, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_reference() {
        let tables = vec![table("orders", &["users"])];
        match resolve_load_order(&tables).unwrap_err() {
            TvalError::UnknownReference { table, target } => {
                assert_eq!(table, "orders");
                assert_eq!(target, "users");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_does_not_block() {
        let tables = vec![table("employees", &["employees"])];
        let order = resolve_load_order(&tables).unwrap();
        assert_eq!(names(&order), vec!["employees"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let tables = vec![table("a", &[]), table("a", &[])];
        assert!(resolve_load_order(&tables).is_err());
    }

    /// Random DAGs: table `tN` may only reference tables with a lower index.
    fn dag_strategy() -> impl Strategy<Value = Vec<TableDefinition>> {
        (1usize..12).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n)
                .prop_map(move |edges| {
                    (0..n)
                        .map(|i| {
                            let refs: Vec<String> = (0..i)
                                .filter(|j| edges[i][*j])
                                .map(|j| format!("t{j:02}"))
                                .collect();
                            let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
                            table(&format!("t{i:02}"), &refs)
                        })
                        .collect::<Vec<_>>()
                })
                .prop_shuffle()
        })
    }

    proptest! {
        #[test]
        fn prop_order_respects_references(tables in dag_strategy()) {
            let order = resolve_load_order(&tables).unwrap();
            prop_assert_eq!(order.len(), tables.len());
            let position: HashMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(i, t)| (t.name.as_str(), i))
                .collect();
            for t in &tables {
                for target in t.referenced_tables() {
                    prop_assert!(position[target] < position[t.name.as_str()]);
                }
            }
        }

        #[test]
        fn prop_order_is_independent_of_input_order(tables in dag_strategy()) {
            let first = names(&resolve_load_order(&tables).unwrap());
            let mut reversed = tables.clone();
            reversed.reverse();
            let second = names(&resolve_load_order(&reversed).unwrap());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_cycle_always_detected(len in 2usize..8) {
            let tables: Vec<TableDefinition> = (0..len)
                .map(|i| {
                    let next = format!("c{}", (i + 1) % len);
                    table(&format!("c{i}"), &[next.as_str()])
                })
                .collect();
            match resolve_load_order(&tables) {
                Err(TvalError::CyclicDependency { tables: members }) => {
                    prop_assert_eq!(members.len(), len);
                }
                other => prop_assert!(false, "expected cycle, got {:?}", other.map(|o| o.len())),
            }
        }
    }
}
