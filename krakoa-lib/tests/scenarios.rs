use krakoa_lib::compile_source;
use krakoa_lib::compiler::CompilationError;
use krakoa_lib::core::*;
use krakoa_lib::vm::*;

fn runtime(src: &str) -> Runtime {
    Runtime::new(compile_source(src).unwrap())
}

fn value_of<'a>(frame: &'a Frame, id: &str) -> Option<&'a Value> {
    frame.get(id).and_then(Value::as_map).and_then(|o| o.get("value"))
}

#[test]
fn without_trigger_frames_stay() {
    let mut rt = runtime(r#"🧠("C") { 📌("S", value: 5); }"#);
    assert_eq!(rt.run(100), RunOutcome::Halted { steps: 2 });
    assert_eq!(rt.stack.len(), 3);
    assert!(rt.stack[0].data.is_empty());
    assert_eq!(value_of(&rt.stack[2], "S"), Some(&Value::number(5.0)));
}

#[test]
fn trigger_merges_into_root() {
    let mut rt = runtime(r#"➔ 👤("Wade") { 📌("Health", value: 100); }"#);
    rt.run(100);
    assert_eq!(rt.registers.status, Status::Halted);
    assert_eq!(rt.stack.len(), 1);
    let root = &rt.stack[0];
    assert!(root.get("Wade").is_some());
    assert_eq!(value_of(root, "Health"), Some(&Value::number(100.0)));
}

#[test]
fn inheritance_visits_targets_in_tag_order() {
    let mut rt = runtime(
        r#"
        📌("Armor", value: 5) 🔑[#Alpha];
        📌("Blade", value: 7) 🔑[#Beta];
        ➔ 👤("Wade") { 🔗(mode: "Inheritance") 🔑[@Alpha, @Beta]; }
    "#,
    );
    let mut visited = vec![];
    while rt.is_running() {
        visited.push(rt.registers.ip);
        rt.step();
    }
    let first_armor = visited.iter().position(|&a| a == 0).unwrap();
    let first_blade = visited.iter().position(|&a| a == 1).unwrap();
    assert!(first_armor < first_blade);
    assert_eq!(visited.last(), Some(&2));
    assert_eq!(value_of(&rt.stack[0], "Blade"), Some(&Value::number(7.0)));
}

#[test]
fn trigger_cycles_once_per_tag() {
    let mut rt = runtime(r#"➔ 🔑[#a, #b, #c] 👤("X") { 🧪("tick"); }"#);
    rt.register_plugin("🧪", |rt, _| {
        let ticks = rt.view().lookup("ticks").and_then(Value::as_f64).unwrap_or(0.0);
        rt.base_frame_mut()?
            .data
            .insert("ticks".into(), Value::number(ticks + 1.0));
        Ok(())
    });
    rt.run(100);
    assert_eq!(rt.stack[0].get("ticks"), Some(&Value::number(3.0)));
    assert_eq!(rt.stack.len(), 1);
}

#[test]
fn implicit_return_only_before_the_body_executes() {
    // the element pushes no frame, so control returns to ➔ right after it
    let mut rt = runtime(r#"➔ 🧪("probe") { 📌("Inner"); }"#);
    assert_eq!(rt.run(100), RunOutcome::Halted { steps: 3 });

    let mut rt = runtime(r#"➔ 👤("W") { 📌("Inner"); }"#);
    assert_eq!(rt.run(100), RunOutcome::Halted { steps: 4 });
}

#[test]
fn lambdas_see_absorbed_data() {
    let mut rt = runtime(
        r#"
        ➔ 👤("Wade") {
            📌("MaxHealth", value: 100);
            📌("Health", value: λ(ctx.MaxHealth / 2));
            ⚓("Hurt", condition: λ(ctx.Health < 60)) { 📡("regenerate"); };
            ⚓("Fine", condition: λ(ctx.Health >= 60)) { 📡("rest"); };
        }
    "#,
    );
    rt.run(100);
    let root = &rt.stack[0];
    assert_eq!(value_of(root, "Health"), Some(&Value::number(50.0)));
    let signals: Vec<_> = root.signals.iter().map(|s| s.name.clone()).collect();
    assert_eq!(signals, vec![Value::str("regenerate")]);
}

#[test]
fn nested_triggers_return_to_the_enclosing_scope() {
    let mut rt = runtime(
        r#"
        ➔ 👤("Outer") {
            ➔ 🧬("Inner") { 📌("Deep", value: 1); };
            📌("After", value: 2);
        }
    "#,
    );
    rt.run(100);
    assert_eq!(rt.stack.len(), 1);
    let root = &rt.stack[0];
    assert_eq!(value_of(root, "Deep"), Some(&Value::number(1.0)));
    assert_eq!(value_of(root, "After"), Some(&Value::number(2.0)));
}

#[test]
fn logs_end_up_in_root() {
    let mut rt = runtime(
        r#"
        📂("Greeting", content: "Bub") 🔑[#hi];
        ➔ 👤("Logan") {
            💬(to: "Wade") 🔑[@hi];
            📡("snikt", payload: 3);
        }
    "#,
    );
    rt.run(100);
    let root = &rt.stack[0];
    assert_eq!(root.communication.len(), 1);
    assert_eq!(root.communication[0].message, Value::str("Bub"));
    assert_eq!(root.communication[0].target, Value::str("Wade"));
    assert_eq!(root.signals.len(), 1);
    assert_eq!(root.signals[0].name, Value::str("snikt"));
}

#[test]
fn programs_survive_json() {
    let src = r#"
        📌("Armor", value: 5) 🔑[#Alpha];
        ➔ 👤("Wade", mood: "sassy") { 🔗("Inheritance") 🔑[@Alpha]; 📌("Health", value: 100); }
    "#;
    let program = compile_source(src).unwrap();
    let json = program.to_json().unwrap();
    let reloaded = Program::from_json(&json).unwrap();
    assert_eq!(program, reloaded);

    let mut direct = Runtime::new(program);
    let mut loaded = Runtime::new(reloaded);
    assert_eq!(direct.run(100), loaded.run(100));
    assert_eq!(direct.stack, loaded.stack);
}

#[test]
fn node_json_compiles_like_source() {
    let json = r#"[
        {"type": "➔", "params": {"to": "Wade"}, "body": [
            {"type": "👤", "params": {"id": "Wade"}, "body": [
                {"type": "📌", "params": {"id": "Health", "value": 100}}
            ]}
        ]}
    ]"#;
    let forest = Node::forest_from_json(json).unwrap();
    let mut rt = Runtime::new(krakoa_lib::compiler::compile(&forest).unwrap());
    rt.run(100);
    assert_eq!(value_of(&rt.stack[0], "Health"), Some(&Value::number(100.0)));
}

#[test]
fn errors_convert_into_the_crate_error() {
    let err = compile_source("👤(").unwrap_err();
    assert!(matches!(err, krakoa_lib::Error::Syntax(_)));
    let err = compile_source(r#"👤("W") 🔑[@Nobody];"#).unwrap_err();
    assert!(matches!(err, krakoa_lib::Error::Compilation(_)));
}

#[test]
fn hashtags_stay_lenient_while_references_fail() {
    // the carrier defines Beacon, nothing defines Phantom
    let json = r#"[
        {"type": "📡", "params": {"id": "flare"},
         "tags": [{"root": "Beacon", "kind": "hashtag", "segments": ["Phantom"]}]}
    ]"#;
    let forest = Node::forest_from_json(json).unwrap();
    let prog = krakoa_lib::compiler::compile(&forest).unwrap();
    let tag = &prog.code[&0].tags[0];
    assert_eq!(tag.address, -1);
    assert_eq!(tag.original.as_deref(), Some("#Beacon"));
    assert_eq!(prog.symbols["Beacon"], 0);

    let err = compile_source(r#"📡("flare") 🔑[@Phantom];"#).unwrap_err();
    assert!(matches!(
        err,
        krakoa_lib::Error::Compilation(CompilationError::UnreachableReference { .. })
    ));
    // a reference never vouches for its own carrier
    assert!(compile_source(r#"👤("W") 🔑[@W];"#).is_ok());
    assert!(compile_source(r#"👤("W") 🔑[@Nobody, #Nobody];"#).is_ok());
    assert!(compile_source(r#"👤("W") 🔑[@Nobody];"#).is_err());
}

#[test]
fn deadpool() {
    let mut rt = runtime(include_str!("../../scripts/deadpool.kts"));
    assert!(matches!(rt.run(1000), RunOutcome::Halted { .. }));
    assert_eq!(rt.stack.len(), 1);
    let root = &rt.stack[0];
    assert_eq!(value_of(root, "Health"), Some(&Value::number(40.0)));
    assert!(root.has_tag("PsychologicalBuffer"));

    assert_eq!(root.communication.len(), 1);
    let said = &root.communication[0];
    assert_eq!(said.target, Value::str("Architect"));
    assert!(said.message.as_str().unwrap().starts_with("Hey, Architect!"));

    let signals: Vec<_> = root.signals.iter().map(|s| s.name.clone()).collect();
    assert_eq!(signals, vec![Value::str("Meta Awareness")]);
}

#[test]
fn genesis_cycles_per_tag() {
    let mut rt = runtime(include_str!("../../scripts/genesis.kts"));
    assert!(matches!(rt.run(1000), RunOutcome::Halted { .. }));
    let root = &rt.stack[0];
    // one signal per cycle
    assert_eq!(root.signals.len(), 2);
    assert_eq!(root.signals[0].payload, Value::str("Active"));
}
