use crate::core::*;
use crate::vm::*;

/// Builds what a contextual instruction stands for: its params, evaluated (undefined
/// results are dropped), plus `__type`, `__address` and `__timestamp`.
pub fn context_object(rt: &Runtime, fetched: &Fetched) -> Object {
    let mut obj: Object = fetched
        .instr
        .params
        .iter()
        .filter_map(|(k, v)| Some((k.clone(), rt.evaluate(v)?)))
        .collect();
    obj.insert("__type".into(), Value::str(fetched.instr.op.glyph()));
    obj.insert("__address".into(), Value::number(fetched.address as f64));
    obj.insert(
        "__timestamp".into(),
        Value::number(fetched.instr.timestamp as f64),
    );
    obj
}

/// pushes a frame `{id: context object}`. `bsp` stays where it is
pub fn exec_contextual(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let id = match &fetched.instr.id {
        Some(id) => id.clone(),
        None => bail!(MissingId {
            address: fetched.address,
            op: fetched.instr.op.clone()
        }),
    };
    let obj = context_object(rt, fetched);
    rt.stack.push(Frame::with_entry(id, Value::Map(obj)));
    rt.registers.esp = rt.stack.top_index();
    if let Some(scope) = rt.active_scope_mut() {
        scope.is_executing = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse;

    #[test]
    fn test_context_object() {
        let prog = compile(&parse(r#"👤("Wade", mood: "sassy", hp: λ(40 + 2), gone: λ(undefined));"#).unwrap())
            .unwrap();
        let mut rt = Runtime::new(prog);
        assert!(rt.step());
        assert_eq!(rt.registers.esp, 1);
        let obj = rt.stack[1].get("Wade").and_then(Value::as_map).unwrap();
        assert_eq!(obj["mood"], Value::str("sassy"));
        assert_eq!(obj["hp"], Value::number(42.0));
        assert!(!obj.contains_key("gone"));
        assert_eq!(obj["__type"], Value::str("👤"));
        assert_eq!(obj["__address"], Value::number(0.0));
        assert!(Value::Map(obj.clone()).is_context_object());
        assert_eq!(rt.registers.bsp, 0);
    }
}
