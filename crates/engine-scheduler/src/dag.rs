use std::collections::{HashMap, VecDeque};

use engine_core::{EngineError, Step};

/// Dependency graph over a plan's steps. Vertices are step identifiers;
/// a directed edge `dependency -> dependent` exists for every entry in a
/// step's `depends_on` list. In-degree counts unmet dependencies, so a
/// step is ready exactly when its in-degree reaches zero.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index_of: HashMap<String, usize>,
    /// dependents[v] = steps that depend on v.
    dependents: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    pub fn build(steps: &[Step]) -> Self {
        let ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
        let index_of: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut dependents = vec![Vec::new(); ids.len()];
        let mut in_degree = vec![0usize; ids.len()];

        for (u_idx, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                if let Some(&v_idx) = index_of.get(dep) {
                    dependents[v_idx].push(u_idx);
                    in_degree[u_idx] += 1;
                }
            }
        }

        Self {
            ids,
            index_of,
            dependents,
            in_degree,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id_at(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    pub fn dependents_of(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_degree[idx]
    }

    /// Wave-by-wave topological ordering (Kahn's algorithm). Each inner
    /// vec is a set of step indices whose dependencies are all satisfied
    /// by the end of the previous wave. Errors with `CircularDependency`
    /// naming the unreachable steps if the graph is not acyclic.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, EngineError> {
        let mut in_degree = self.in_degree.clone();
        let mut waves = Vec::new();
        let mut frontier: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0usize;

        while !frontier.is_empty() {
            visited += frontier.len();
            let mut next = Vec::new();
            for &u in &frontier {
                for &v in &self.dependents[u] {
                    in_degree[v] -= 1;
                    if in_degree[v] == 0 {
                        next.push(v);
                    }
                }
            }
            waves.push(std::mem::take(&mut frontier));
            frontier = next;
        }

        if visited != self.len() {
            let stuck: Vec<String> = (0..self.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.ids[i].clone())
                .collect();
            return Err(EngineError::CircularDependency(stuck));
        }

        Ok(waves)
    }

    /// Longest chain of dependencies (by step count), used for
    /// parallelizability analysis.
    pub fn critical_path(&self) -> Result<Vec<usize>, EngineError> {
        let waves = self.waves()?;
        // longest_to[i] = length of the longest chain ending at i.
        let mut longest_to = vec![1usize; self.len()];
        let mut predecessor = vec![None; self.len()];

        for wave in &waves {
            for &u in wave {
                for &v in &self.dependents[u] {
                    if longest_to[u] + 1 > longest_to[v] {
                        longest_to[v] = longest_to[u] + 1;
                        predecessor[v] = Some(u);
                    }
                }
            }
        }

        let Some((mut cur, _)) = longest_to
            .iter()
            .enumerate()
            .max_by_key(|&(_, len)| *len)
        else {
            return Ok(Vec::new());
        };

        let mut path = VecDeque::new();
        loop {
            path.push_front(cur);
            match predecessor[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        Ok(path.into_iter().collect())
    }
}
