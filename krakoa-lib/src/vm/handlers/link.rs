use tracing::{debug, trace};

use std::collections::HashSet;

use super::absorb_subtree;
use crate::core::*;
use crate::vm::*;

/// `🔗` in one of two modes, given by the `mode` param or the id:
///
/// - `Inheritance` visits the targets of its tags one at a time, see [`bumerang`]
/// - `Return` jumps back to the active trigger
pub fn exec_link(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let mode = fetched
        .instr
        .str_param("mode")
        .or(fetched.instr.id.as_deref())
        .unwrap_or_default();
    match mode {
        "Inheritance" => exec_inheritance(rt, fetched),
        "Return" => exec_return(rt, fetched),
        other => bail!(UnknownMode {
            address: fetched.address,
            mode: other.to_owned()
        }),
    }
}

fn exec_inheritance(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    if rt.active_scope().is_none() {
        bail!(RogueInheritance {
            address: fetched.address
        });
    }
    if !bumerang(rt, fetched) {
        trace!(address = fetched.address, "inheritance done");
    }
    Ok(())
}

fn exec_return(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let trigger = rt.active_scope().map(|scope| scope.address as Address);
    match trigger {
        Some(trigger) if trigger != rt.registers.ip => {
            debug!(address = fetched.address, trigger, "return");
            rt.jump(trigger);
            Ok(())
        }
        _ => bail!(RogueReturn {
            address: fetched.address
        }),
    }
}

/// Visits the next resolved tag target of the instruction, absorbing its subtree first.
/// Control comes back to the instruction once the target executed, so that the next tag
/// is visited on the following execution. Returns false when all tags were visited (or
/// there is no active scope), in which case nothing happened. Tags pointing back at the
/// instruction itself are skipped.
pub fn bumerang(rt: &mut Runtime, fetched: &Fetched) -> bool {
    let address = fetched.address as Address;
    let program = rt.program.clone();
    let tags = &fetched.instr.tags;
    let Some(scope) = rt.active_scope_mut() else {
        return false;
    };
    let cursor = scope.link_cursors.entry(fetched.address).or_insert(0);
    let mut target = None;
    while *cursor < tags.len() {
        let tag = &tags[*cursor];
        *cursor += 1;
        if tag.address == address {
            trace!(tag = %tag, "skipping tag of the instruction itself");
            continue;
        }
        if tag.is_resolved() && program.fetch(tag.address).is_some() {
            target = Some(tag.address);
            break;
        }
        trace!(tag = %tag, "skipping unresolved tag");
    }
    let Some(target) = target else {
        return false;
    };
    scope.excursion = Some(Excursion {
        target,
        resume: address,
    });

    absorb_subtree(rt, target, &mut HashSet::new());
    debug!(address = fetched.address, target, "bumerang");
    rt.jump(target);
    true
}
