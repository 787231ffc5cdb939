use tracing::debug;

use std::collections::HashSet;

use super::{absorb_range, absorb_subtree};
use crate::core::*;
use crate::vm::*;

/// Enters, cycles or leaves a trigger scope.
///
/// A trigger is executed once on entry and then again every time its body returns into
/// it. While the scope has cycles left (one per tag, at least one), the body runs again,
/// otherwise the scope is merged into its parent and control goes on after the trigger.
pub fn exec_trigger(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let owns_scope = rt
        .active_scope()
        .map_or(false, |scope| scope.address == fetched.address);
    if !owns_scope {
        return enter(rt, fetched);
    }

    let scope = rt
        .active_scope_mut()
        .ok_or_else(|| rt_err!("trigger {} lost its scope", fetched.address))?;
    if scope.cycle.count + 1 < scope.cycle.maxim {
        scope.cycle.count += 1;
        scope.is_executing = false;
        scope.link_cursors.clear();
        scope.excursion = None;
        let (count, cur) = (scope.cycle.count, scope.cycle.cur_address);
        debug!(address = fetched.address, count, "trigger cycles");
        rt.jump(cur);
        return Ok(());
    }
    exit(rt, fetched)
}

fn enter(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let instr = &fetched.instr;
    let label = instr.str_param("to").or(instr.id.as_deref());
    let cycle = Cycle {
        count: 0,
        maxim: instr.tags.len().max(1),
        cur_address: instr.next.first().copied().unwrap_or(UNRESOLVED),
        ret_address: instr.next.get(1).copied().unwrap_or(UNRESOLVED),
    };
    let scope = TriggerScope::new(fetched.address, label, rt.registers.bsp, cycle);
    debug!(name = %scope.name, parent = scope.parent, cycles = cycle.maxim, "trigger enters");
    rt.stack.push(Frame::with_scope(scope));
    rt.registers.bsp = rt.stack.top_index();
    rt.registers.esp = rt.registers.bsp;

    let mut visited = HashSet::new();
    absorb_range(rt, instr.body_range(fetched.address), &mut visited);
    for tag in &instr.tags {
        absorb_subtree(rt, tag.address, &mut visited);
    }
    rt.jump(cycle.cur_address);
    Ok(())
}

/// folds every frame above the scope frame into it, then the scope frame into its parent
fn exit(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let bsp = rt.registers.bsp;
    let children: Vec<Frame> = rt.stack.drain(bsp + 1..).collect();
    let mut scope_frame = rt
        .stack
        .pop()
        .ok_or_else(|| rt_err!("scope frame of trigger {} is missing", fetched.address))?;
    for child in children {
        scope_frame.merge(child);
    }
    let scope = scope_frame
        .scope
        .take()
        .ok_or_else(|| rt_err!("frame {} is not a scope frame", bsp))?;
    rt.stack
        .get_mut(scope.parent)
        .ok_or_else(|| rt_err!("parent frame {} of {} is missing", scope.parent, scope.name))?
        .merge(scope_frame);
    rt.registers.bsp = scope.parent;
    rt.registers.esp = rt.stack.top_index();

    let target = fetched.address as Address;
    let resume = rt.active_scope_mut().and_then(|parent| match parent.excursion {
        Some(exc) if exc.target == target => {
            parent.excursion = None;
            Some(exc.resume)
        }
        _ => None,
    });
    debug!(name = %scope.name, resume = ?resume, "trigger exits");
    rt.jump(resume.unwrap_or(scope.cycle.ret_address));
    Ok(())
}
