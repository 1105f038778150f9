//! Try-Catch Resolver (C8, spec §4.6 step 4, §4.8): turns a method's
//! `try_catches` table into a chain of dispatch states that test the
//! pending-exception's type (or match unconditionally for `ANY`) and
//! transition to the matching handler, falling through to the next catch
//! in the same protected region otherwise.

use std::collections::HashMap;

use crate::bytecode::{LabelId, TryCatch};
use crate::pools::LabelPool;

use super::StateFragment;

/// One dispatch state in a materialized catch chain.
struct ChainLink {
    state_id: i32,
    exception_type: Option<String>,
    handler_state: i32,
    /// `None` on the last link of a chain: falling through there means no
    /// catch in this region matched, and the exception keeps unwinding.
    next_state: Option<i32>,
}

/// Groups `try_catches` entries that share a protected region (same
/// `start`/`end` pair) into ordered sequences, preserving source order —
/// each sequence is tried top to bottom, matching the bytecode's own
/// catch-table precedence.
fn group_into_sequences(try_catches: &[TryCatch]) -> Vec<Vec<TryCatch>> {
    let mut order: Vec<(LabelId, LabelId)> = Vec::new();
    let mut groups: HashMap<(LabelId, LabelId), Vec<TryCatch>> = HashMap::new();
    for tc in try_catches {
        let key = (tc.start, tc.end);
        if !groups.contains_key(&key) {
            order.push(key);
        }
        groups.entry(key).or_default().push(tc.clone());
    }
    order
        .into_iter()
        .map(|key| groups.remove(&key).unwrap())
        .collect()
}

/// Materializes every protected region's catch sequence into dispatch
/// states, driven by the worklist algorithm of spec §4.6 step 4: each pass
/// consumes one sequence and, when it has more than one clause, enqueues a
/// fresh "rest of chain" sequence; the loop ends when a pass adds nothing
/// new (spec §9: "cycles are impossible because each iteration strictly
/// consumes a prefix and enqueues a shorter suffix").
///
/// Returns the materialized fragments plus, for each protected region, the
/// state id of its chain's first dispatch link — the value emitted code
/// looks up when a pending exception needs to be routed (see
/// [`super::state_machine`]).
pub fn resolve(
    try_catches: &[TryCatch],
    labels: &mut LabelPool,
) -> (Vec<StateFragment>, HashMap<(LabelId, LabelId), i32>) {
    let sequences = group_into_sequences(try_catches);
    let mut fragments = Vec::new();
    let mut region_entry = HashMap::new();

    let mut worklist: Vec<Vec<TryCatch>> = sequences;
    while let Some(seq) = worklist.pop() {
        if seq.is_empty() {
            continue;
        }
        let head = &seq[0];
        let rest = &seq[1..];

        let state_id = labels.new_standalone_state();
        if rest.is_empty() {
            region_entry
                .entry((head.start, head.end))
                .or_insert(state_id);
        } else {
            // Only the very first link of the original sequence is the
            // region's public entry point; recursive "rest" sequences are
            // only reachable by fallthrough from their predecessor.
            region_entry
                .entry((head.start, head.end))
                .or_insert(state_id);
        }

        let handler_state = labels.name_of(head.handler);
        let next_state = if rest.is_empty() {
            None
        } else {
            let next_id = labels.new_standalone_state();
            worklist.push(rest.to_vec());
            Some(next_id)
        };

        let link = ChainLink {
            state_id,
            exception_type: head.exception_type.clone(),
            handler_state,
            next_state,
        };
        fragments.push(render_link(&link));
    }

    (fragments, region_entry)
}

fn render_link(link: &ChainLink) -> StateFragment {
    let body = match (&link.exception_type, link.next_state) {
        (None, _) => format!(
            "  /* ANY */\n  state = {};\n  continue;",
            link.handler_state
        ),
        (Some(ty), Some(next)) => format!(
            "  if (nv_runtime_exception_is_instance(__exc, \"{ty}\")) {{ state = {handler}; continue; }}\n  state = {next};\n  continue;",
            ty = ty,
            handler = link.handler_state,
            next = next,
        ),
        (Some(ty), None) => format!(
            "  if (nv_runtime_exception_is_instance(__exc, \"{ty}\")) {{ state = {handler}; continue; }}\n  nv_runtime_rethrow(__exc);",
            ty = ty,
            handler = link.handler_state,
        ),
    };
    StateFragment {
        state_id: link.state_id,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(start: u32, end: u32, handler: u32, ty: Option<&str>) -> TryCatch {
        TryCatch {
            start: LabelId(start),
            end: LabelId(end),
            handler: LabelId(handler),
            exception_type: ty.map(|s| s.to_string()),
        }
    }

    #[test]
    fn single_any_catch_produces_one_unconditional_link() {
        let mut pool = LabelPool::new(1);
        let catches = vec![tc(0, 1, 2, None)];
        let (fragments, entry) = resolve(&catches, &mut pool);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].body.contains("ANY"));
        assert!(entry.contains_key(&(LabelId(0), LabelId(1))));
    }

    #[test]
    fn multi_catch_chain_mints_one_link_per_clause() {
        let mut pool = LabelPool::new(2);
        let catches = vec![
            tc(0, 1, 10, Some("java/lang/ArithmeticException")),
            tc(0, 1, 11, Some("java/lang/RuntimeException")),
        ];
        let (fragments, _entry) = resolve(&catches, &mut pool);
        assert_eq!(fragments.len(), 2);
    }

    #[test]
    fn distinct_regions_get_distinct_entries() {
        let mut pool = LabelPool::new(3);
        let catches = vec![tc(0, 1, 10, None), tc(2, 3, 11, None)];
        let (_fragments, entry) = resolve(&catches, &mut pool);
        assert_eq!(entry.len(), 2);
        assert_ne!(
            entry[&(LabelId(0), LabelId(1))],
            entry[&(LabelId(2), LabelId(3))]
        );
    }

    #[test]
    fn empty_try_catches_produce_nothing() {
        let mut pool = LabelPool::new(4);
        let (fragments, entry) = resolve(&[], &mut pool);
        assert!(fragments.is_empty());
        assert!(entry.is_empty());
    }
}
