//! Post-dominator tree.
//!
//! Cooper, Harvey and Kennedy's iterative algorithm run on the reverse CFG. A virtual exit node
//! joins every block without successors, so functions with several returns still have one root.

use crate::function::{BlockId, Function};

/// Position of an instruction: block and index within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrPos {
    pub block: BlockId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct PostDomTree {
    /// Immediate post-dominator of each node; `exit` is the last node. `None` for blocks that never
    /// reach an exit.
    ipdom: Vec<Option<usize>>,
    exit: usize,
}

impl PostDomTree {
    pub fn compute(func: &Function) -> Self {
        let n = func.blocks.len();
        let exit = n;
        let succs: Vec<Vec<usize>> = (0..n)
            .map(|b| {
                let s = func.successors(BlockId(b as u32));
                if s.is_empty() {
                    vec![exit]
                } else {
                    s.into_iter().map(BlockId::index).collect()
                }
            })
            .collect();

        // Reverse-CFG successors are forward predecessors.
        let mut rev_succs = vec![Vec::new(); n + 1];
        for (b, ss) in succs.iter().enumerate() {
            for &s in ss {
                rev_succs[s].push(b);
            }
        }

        let mut post_order = Vec::with_capacity(n + 1);
        let mut visited = vec![false; n + 1];
        let mut stack = vec![(exit, 0usize)];
        visited[exit] = true;
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if let Some(&child) = rev_succs[node].get(next) {
                top.1 += 1;
                if !visited[child] {
                    visited[child] = true;
                    stack.push((child, 0));
                }
            } else {
                post_order.push(node);
                stack.pop();
            }
        }

        let mut order_of = vec![usize::MAX; n + 1];
        for (i, &node) in post_order.iter().enumerate() {
            order_of[node] = i;
        }

        let mut ipdom: Vec<Option<usize>> = vec![None; n + 1];
        ipdom[exit] = Some(exit);

        let mut changed = true;
        while changed {
            changed = false;
            for &node in post_order.iter().rev() {
                if node == exit {
                    continue;
                }
                let mut new_idom: Option<usize> = None;
                for &s in &succs[node] {
                    if ipdom[s].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => s,
                        Some(cur) => intersect(&ipdom, &order_of, s, cur),
                    });
                }
                if new_idom.is_some() && ipdom[node] != new_idom {
                    ipdom[node] = new_idom;
                    changed = true;
                }
            }
        }

        Self { ipdom, exit }
    }

    /// Immediate post-dominator of `block`; `None` when it is the virtual exit or unreachable.
    pub fn ipdom(&self, block: BlockId) -> Option<BlockId> {
        match self.ipdom.get(block.index()).copied().flatten() {
            Some(p) if p != self.exit => Some(BlockId(p as u32)),
            _ => None,
        }
    }

    /// Whether every path from `b` to an exit passes through `a` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let target = a.index();
        let mut cur = b.index();
        loop {
            if cur == target {
                return true;
            }
            match self.ipdom.get(cur).copied().flatten() {
                Some(next) if next != cur => cur = next,
                _ => return false,
            }
        }
    }

    /// Instruction-level query: in one block the later instruction post-dominates the earlier one.
    pub fn dominates_instr(&self, a: InstrPos, b: InstrPos) -> bool {
        if a.block == b.block {
            return a.index >= b.index;
        }
        self.dominates(a.block, b.block)
    }
}

fn intersect(ipdom: &[Option<usize>], order_of: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while order_of[a] < order_of[b] {
            match ipdom[a] {
                Some(next) => a = next,
                None => return b,
            }
        }
        while order_of[b] < order_of[a] {
            match ipdom[b] {
                Some(next) => b = next,
                None => return a,
            }
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::function::Terminator;
    use crate::stage::ShaderStage;
    use crate::value::{EntryValue, Operand};

    /// entry -> (then | else) -> join -> return
    fn diamond() -> Function {
        let mut func = Function::new("main", ShaderStage::Vertex);
        let then_bb = func.add_block();
        let else_bb = func.add_block();
        let join = func.add_block();
        func.set_terminator(
            BlockId(0),
            Terminator::CondBranch {
                cond: Operand::Entry(EntryValue::VertexId),
                if_true: then_bb,
                if_false: else_bb,
            },
        );
        func.set_terminator(then_bb, Terminator::Branch(join));
        func.set_terminator(else_bb, Terminator::Branch(join));
        func
    }

    #[test]
    fn join_block_post_dominates_both_arms() {
        let func = diamond();
        let tree = PostDomTree::compute(&func);
        assert!(tree.dominates(BlockId(3), BlockId(0)));
        assert!(tree.dominates(BlockId(3), BlockId(1)));
        assert!(!tree.dominates(BlockId(1), BlockId(0)));
        assert!(!tree.dominates(BlockId(1), BlockId(2)));
        assert_eq!(tree.ipdom(BlockId(0)), Some(BlockId(3)));
        assert_eq!(tree.ipdom(BlockId(3)), None);
    }

    #[test]
    fn separate_returns_do_not_post_dominate_each_other() {
        let mut func = diamond();
        func.set_terminator(BlockId(1), Terminator::Return);
        func.set_terminator(BlockId(2), Terminator::Return);
        let tree = PostDomTree::compute(&func);
        assert!(!tree.dominates(BlockId(1), BlockId(0)));
        assert!(!tree.dominates(BlockId(2), BlockId(0)));
        assert_eq!(tree.ipdom(BlockId(0)), None);
    }

    #[test]
    fn later_instruction_in_a_block_wins() {
        let func = diamond();
        let tree = PostDomTree::compute(&func);
        let early = InstrPos {
            block: BlockId(3),
            index: 0,
        };
        let late = InstrPos {
            block: BlockId(3),
            index: 2,
        };
        assert!(tree.dominates_instr(late, early));
        assert!(!tree.dominates_instr(early, late));
    }
}
