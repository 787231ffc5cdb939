use tracing::info;

use super::bumerang;
use crate::utils::now_millis;
use crate::vm::lambda::{evaluate_or_undefined, is_truthy};
use crate::vm::*;

/// what `💬` says when neither a `message` param nor a `Message` is in scope
const FALLBACK_MESSAGE: &str =
    r#"ctx["Chimichanga Optimized"] ?? ctx.Greeting ?? ctx.content ?? ctx.Message"#;
const SILENCE: &str = "(silence)";

/// Records a message in the communication log of the active scope frame. Inside a trigger
/// scope, the tags of the instruction are visited first (see [`bumerang`]).
pub fn exec_speech(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    if bumerang(rt, fetched) {
        return Ok(());
    }
    let param = |key| fetched.instr.param(key).and_then(|v| rt.evaluate(v));
    let target = param("target")
        .or_else(|| param("to"))
        .unwrap_or(Value::Null);
    let channel = param("channel").unwrap_or(Value::Null);
    let message = param("message")
        .and_then(spoken)
        .or_else(|| rt.view().lookup("Message").cloned().and_then(spoken))
        .or_else(|| evaluate_or_undefined(FALLBACK_MESSAGE, &rt.view()).and_then(spoken))
        .unwrap_or_else(|| Value::str(SILENCE));

    let source = rt.registers.bsp;
    info!(source, target = %target, message = %message, "💬");
    let record = Communication {
        timestamp: now_millis(),
        target,
        message,
        channel,
        source,
        address: fetched.address,
    };
    rt.base_frame_mut()?.communication.push(record);
    Ok(())
}

/// context objects speak through their `content`, or their `value`
fn spoken(val: Value) -> Option<Value> {
    match val {
        Value::Map(obj) if obj.contains_key("__type") => {
            obj.get("content").or_else(|| obj.get("value")).cloned()
        }
        other => Some(other),
    }
}

/// Emits a signal into the active scope frame, and into every other frame when
/// `broadcast` is truthy.
pub fn exec_signal(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    if bumerang(rt, fetched) {
        return Ok(());
    }
    let param = |key| fetched.instr.param(key).and_then(|v| rt.evaluate(v));
    let name = param("name")
        .or_else(|| fetched.instr.id.clone().map(Value::Text))
        .unwrap_or(Value::Null);
    let payload = param("payload").unwrap_or(Value::Null);
    let broadcast = is_truthy(param("broadcast").as_ref());

    let source = rt.registers.bsp;
    info!(source, name = %name, broadcast, "📡");
    let record = SignalRecord {
        timestamp: now_millis(),
        name,
        payload,
        broadcast,
        source,
        address: fetched.address,
    };
    if broadcast {
        for (idx, frame) in rt.stack.iter_mut().enumerate() {
            if idx != source {
                frame.signals.push(record.clone());
            }
        }
    }
    rt.base_frame_mut()?.signals.push(record);
    Ok(())
}
