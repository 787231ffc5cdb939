//! Eager absorption: when a trigger is entered (or a link jumps somewhere), the context
//! objects of the instructions it reaches are copied into the active scope frame, so that
//! lambdas can see them before their instructions ever execute.

use tracing::{trace, warn};

use std::collections::HashSet;
use std::ops::Range;

use super::context_object;
use crate::core::*;
use crate::vm::*;

/// absorbs every instruction in `range`
pub fn absorb_range(rt: &mut Runtime, range: Range<usize>, visited: &mut HashSet<usize>) {
    for address in range {
        absorb_one(rt, address, visited);
    }
}

/// absorbs the instruction at `target` and its whole body
pub fn absorb_subtree(rt: &mut Runtime, target: Address, visited: &mut HashSet<usize>) {
    let end = match rt.program.fetch(target) {
        Some(instr) => instr.body_range(target as usize).end,
        None => return,
    };
    absorb_range(rt, target as usize..end, visited);
}

fn absorb_one(rt: &mut Runtime, address: usize, visited: &mut HashSet<usize>) {
    if !visited.insert(address) {
        return;
    }
    let fetched = match rt.decode(address as Address) {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(address, error = %e, "not absorbed");
            return;
        }
    };

    if let (true, Some(id)) = (fetched.instr.op.is_contextual(), &fetched.instr.id) {
        let obj = context_object(rt, &fetched);
        let Ok(frame) = rt.base_frame_mut() else {
            return;
        };
        frame.data.insert(id.clone(), Value::Map(obj));
        for tag in &fetched.instr.tags {
            if tag.kind == TagKind::Hashtag {
                frame.mark_tag(strip_sigil(&tag.root));
            }
        }
        trace!(address, id = %id, "absorbed");
    }

    // references pull in what they point at, a link pulls in all of its tags
    let pulls_all = fetched.instr.op == OpCode::Link;
    for tag in &fetched.instr.tags {
        if pulls_all || tag.kind == TagKind::Reference {
            absorb_subtree(rt, tag.address, visited);
        }
    }
}
