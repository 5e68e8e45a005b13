//! Set propagation over a relation graph (DeRemer and Pennello's digraph).

use crate::types::Map;
use indexmap::map::Slice;
use std::{cmp, hash::Hash};

pub trait Set {
    fn union_with(&mut self, other: &Self);
}

/// Calculate `F(x) = F'(x) \cup \bigcup { F(y) | x R y }`.
///
/// `result` holds `F'` on entry and `F` on return. The relation is given as
/// the indices of the successors of each entry.
pub fn digraph<K, T>(result: &mut Map<K, T>, successors: &[Vec<usize>])
where
    K: Eq + Hash,
    T: Set,
{
    debug_assert_eq!(result.len(), successors.len(), "relation size mismatch");
    Digraph {
        result: result.as_mut_slice(),
        successors,
        n: vec![0usize; successors.len()],
        stack: vec![],
    }
    .run()
}

struct Digraph<'a, K, T> {
    result: &'a mut Slice<K, T>,
    successors: &'a [Vec<usize>],
    n: Vec<usize>,
    stack: Vec<usize>,
}

impl<K, T> Digraph<'_, K, T>
where
    T: Set,
{
    fn run(&mut self) {
        for x in 0..self.successors.len() {
            if self.n[x] == 0 {
                self.traverse(x);
            }
        }
    }

    fn traverse(&mut self, x: usize) {
        self.stack.push(x);
        let d = self.stack.len();
        self.n[x] = d;

        let successors = self.successors;
        for &y in &successors[x] {
            if self.n[y] == 0 {
                self.traverse(y);
            }
            self.n[x] = cmp::min(self.n[x], self.n[y]);

            if x != y {
                // F(x) <- F(x) \cup F(y)
                let (slot, added) = get_two_mut(&mut self.result, x, y);
                slot.union_with(added);
            }
        }

        if self.n[x] != d {
            return;
        }

        while let Some(s) = self.stack.pop() {
            self.n[s] = usize::MAX;
            if s == x {
                break;
            }
            // F(s) <- F(x)
            let (slot, added) = get_two_mut(&mut self.result, s, x);
            slot.union_with(added);
        }
    }
}

fn get_two_mut<K, V>(slice: &mut Slice<K, V>, x: usize, y: usize) -> (&mut V, &mut V) {
    assert!(
        x != y && cmp::max(x, y) < slice.len(),
        "index condition not satisfied"
    );
    let i = (x + y) / 2 + 1;
    let (a, b) = slice.split_at_mut(i);
    if x < y {
        (&mut a[x], &mut b[y - i])
    } else {
        (&mut b[x - i], &mut a[y])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar::RuleID, lookahead::LookaheadSetPart};

    #[test]
    fn test_get_two_mut() {
        let mut map = Map::default();
        map.insert("a", "a");
        map.insert("b", "b");
        map.insert("c", "c");
        map.insert("d", "d");
        let slice = map.as_mut_slice();
        assert!(matches!(get_two_mut(slice, 0, 1), t if *t.0=="a" && *t.1=="b"));
        assert!(matches!(get_two_mut(slice, 1, 0), t if *t.0=="b" && *t.1=="a"));
        assert!(matches!(get_two_mut(slice, 0, 2), t if *t.0=="a" && *t.1=="c"));
        assert!(matches!(get_two_mut(slice, 2, 1), t if *t.0=="c" && *t.1=="b"));
        assert!(matches!(get_two_mut(slice, 3, 2), t if *t.0=="d" && *t.1=="c"));
    }

    #[test]
    fn propagates_through_cycles() {
        // 0 -> 1 -> 2 -> 1, 3 -> 0
        let mut map: Map<u32, LookaheadSetPart> = Map::default();
        for key in 0..4u16 {
            let terminals = [RuleID::from_raw(key + 1)].into_iter().collect();
            map.insert(u32::from(key), LookaheadSetPart::from_terminals(terminals));
        }
        digraph(&mut map, &[vec![1], vec![2], vec![1], vec![0]]);

        let bits = |key: u32| {
            map[&key]
                .content()
                .iter()
                .map(RuleID::into_raw)
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(0), vec![1, 2, 3]);
        assert_eq!(bits(1), vec![2, 3]);
        assert_eq!(bits(2), vec![2, 3]);
        assert_eq!(bits(3), vec![1, 2, 3, 4]);
    }
}
