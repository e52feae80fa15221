//! Strongly connected components over package-name graphs.
//!
//! Both the resolver and the plan builder need to treat dependency cycles
//! as a single unit; this is Tarjan's algorithm over `name -> {deps}`.

use std::collections::{btree_set, BTreeMap, BTreeSet};

/// Adjacency list: package name to the names it depends on.
pub type NameGraph<'a> = BTreeMap<&'a str, BTreeSet<&'a str>>;

/// Compute the strongly connected components of `graph`.
///
/// Components come out dependencies-first: a component is emitted only after
/// every component it can reach. Members of each component are sorted by
/// name and nodes are visited in name order, so the output is deterministic.
/// Edges to names that are not keys of `graph` are ignored.
#[must_use]
pub fn strongly_connected_components<'a>(graph: &NameGraph<'a>) -> Vec<Vec<&'a str>> {
    let mut tarjan = Tarjan {
        graph,
        next_index: 0,
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };

    for &name in graph.keys() {
        if !tarjan.index.contains_key(name) {
            tarjan.connect(name);
        }
    }

    tarjan.components
}

/// Whether a component is a real cycle (more than one member, or a self-loop).
#[must_use]
pub fn is_cyclic(graph: &NameGraph<'_>, component: &[&str]) -> bool {
    match component {
        [single] => graph.get(single).is_some_and(|deps| deps.contains(single)),
        _ => component.len() > 1,
    }
}

struct Tarjan<'g, 'a> {
    graph: &'g NameGraph<'a>,
    next_index: usize,
    index: BTreeMap<&'a str, usize>,
    lowlink: BTreeMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: BTreeSet<&'a str>,
    components: Vec<Vec<&'a str>>,
}

impl<'g, 'a> Tarjan<'g, 'a> {
    fn enter(&mut self, v: &'a str) {
        self.index.insert(v, self.next_index);
        self.lowlink.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);
    }

    /// Depth-first walk from `root` with an explicit stack of pending edges.
    fn connect(&mut self, root: &'a str) {
        let graph = self.graph;
        let mut work: Vec<(&'a str, btree_set::Iter<'g, &'a str>)> = Vec::new();
        self.enter(root);
        work.push((root, graph[root].iter()));

        while let Some((v, deps)) = work.last_mut() {
            let v = *v;
            if let Some(&w) = deps.next() {
                if !graph.contains_key(w) {
                    continue;
                }
                if !self.index.contains_key(w) {
                    self.enter(w);
                    work.push((w, graph[w].iter()));
                } else if self.on_stack.contains(w) {
                    let low = self.lowlink[v].min(self.index[w]);
                    self.lowlink.insert(v, low);
                }
                continue;
            }

            work.pop();
            if let Some((parent, _)) = work.last() {
                let parent = *parent;
                let low = self.lowlink[parent].min(self.lowlink[v]);
                self.lowlink.insert(parent, low);
            }

            if self.lowlink[v] == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }
}
