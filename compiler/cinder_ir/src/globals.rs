//! Topological ordering of module globals
//!
//! A global's initializer may reference other globals through
//! `GlobalPtr` constants nested anywhere inside array and struct
//! initializers. Since definition must precede use in the emitted module,
//! the globals vector is reordered so every referenced global comes before
//! its referrer (Kahn's algorithm). Reference cycles cannot be ordered;
//! the members of a cycle are appended in their original order instead of
//! failing.

use std::collections::VecDeque;

use hashbrown::HashMap;
use log::{debug, warn};

use crate::module::Module;
use crate::value::{Const, ConstKind};

/// Reorders `module.globals` in place so definitions precede uses.
pub fn sort_globals(module: &mut Module) {
    let count = module.globals.len();
    if count <= 1 {
        return;
    }

    let index_of: HashMap<&str, usize> = module
        .globals
        .iter()
        .enumerate()
        .map(|(i, g)| (g.name.as_str(), i))
        .collect();

    // successors[v] holds the globals whose initializers reference v; they
    // may only be emitted once v has been.
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree: Vec<usize> = vec![0; count];
    for (u, global) in module.globals.iter().enumerate() {
        let mut referenced = Vec::new();
        collect_references(&global.init, &mut referenced);
        for name in referenced {
            let Some(&v) = index_of.get(name) else {
                // Reference to a function or an external symbol; no ordering
                // constraint within this module.
                continue;
            };
            if v == u {
                continue;
            }
            successors[v].push(u);
            in_degree[u] += 1;
        }
    }
    drop(index_of);

    let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(count);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &u in &successors[v] {
            in_degree[u] -= 1;
            if in_degree[u] == 0 {
                queue.push_back(u);
            }
        }
    }

    if order.len() < count {
        // The leftovers form at least one reference cycle; keep them in
        // their original relative order.
        warn!(
            "global initializers form a reference cycle; {} globals kept in source order",
            count - order.len()
        );
        let mut emitted = vec![false; count];
        for &i in &order {
            emitted[i] = true;
        }
        order.extend((0..count).filter(|&i| !emitted[i]));
    }

    debug!("sorted {} globals", count);
    let mut slots: Vec<Option<crate::module::Global>> =
        std::mem::take(&mut module.globals).into_iter().map(Some).collect();
    module.globals = order
        .into_iter()
        .map(|i| slots[i].take().expect("each global emitted once"))
        .collect();
}

/// Collects the names of globals referenced by an initializer. For a union
/// only the selected field is followed; an out-of-range selector falls back
/// to following every field.
fn collect_references<'c>(init: &'c Const, out: &mut Vec<&'c str>) {
    match &init.kind {
        ConstKind::GlobalPtr(name) => out.push(name.as_str()),
        ConstKind::Array(elems) => {
            for elem in elems {
                collect_references(elem, out);
            }
        }
        ConstKind::Struct { is_union, union_field, elems } => {
            if *is_union {
                match union_field.and_then(|i| elems.get(i)) {
                    Some(selected) => collect_references(selected, out),
                    None => {
                        for elem in elems {
                            collect_references(elem, out);
                        }
                    }
                }
            } else {
                for elem in elems {
                    collect_references(elem, out);
                }
            }
        }
        ConstKind::Int(_) | ConstKind::Float(_) | ConstKind::Str(_) => {}
    }
}
