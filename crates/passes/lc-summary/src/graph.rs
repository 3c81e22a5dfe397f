//! Call graph construction and bottom-up scheduling.

use la_arena::ArenaMap;
use lc_model::{Callee, FuncId, Program, Statement};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::algo::tarjan_scc;

/// The static call graph of a program: one node per bodied function, one
/// edge per caller-to-callee pair. External and indirect callees have no
/// node; they are interpreted purely through summaries.
pub struct CallGraph {
    graph: DiGraph<FuncId, ()>,
    nodes: ArenaMap<FuncId, NodeIndex>,
}

impl CallGraph {
    /// Builds the call graph from call statements.
    #[must_use]
    pub fn build(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: ArenaMap<FuncId, NodeIndex> = ArenaMap::default();
        for (func, _) in program.functions.iter() {
            nodes.insert(func, graph.add_node(func));
        }

        for (caller, function) in program.functions.iter() {
            for (_, block) in function.blocks.iter() {
                for statement in &block.statements {
                    let Statement::Call { callee: Callee::Fn(callee), .. } = statement else {
                        continue;
                    };
                    // Calls to ids outside the arena are a model defect; the
                    // validator reports them, the graph just skips them.
                    let Some(&to) = nodes.get(*callee) else { continue };
                    let from = nodes[caller];
                    graph.update_edge(from, to, ());
                }
            }
        }

        Self { graph, nodes }
    }

    /// Strongly connected components in bottom-up order: every group comes
    /// after all groups it calls into, so summaries of callees are final by
    /// the time a caller is analyzed (recursive groups excepted).
    #[must_use]
    pub fn bottom_up_groups(&self) -> Vec<Vec<FuncId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|group| group.into_iter().map(|node| self.graph[node]).collect())
            .collect()
    }

    /// Whether `func` calls itself directly.
    #[must_use]
    pub fn is_self_recursive(&self, func: FuncId) -> bool {
        let node = self.nodes[func];
        self.graph.contains_edge(node, node)
    }
}
