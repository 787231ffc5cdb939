use crate::core::*;
use crate::vm::lambda::is_truthy;
use crate::vm::*;

/// falls into the body if `condition` holds (or is missing), skips it otherwise
pub fn exec_anchor(rt: &mut Runtime, fetched: &Fetched) -> ExecResult {
    let open = match fetched.instr.param("condition") {
        None => true,
        Some(cond) => is_truthy(rt.evaluate(cond).as_ref()),
    };
    if !open {
        let exit = fetched.instr.next.get(1).copied().unwrap_or(UNRESOLVED);
        rt.jump(exit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse;

    fn visited(src: &str) -> Vec<String> {
        let mut rt = Runtime::new(compile(&parse(src).unwrap()).unwrap());
        rt.run(100);
        rt.stack
            .iter()
            .flat_map(|f| f.data.keys().cloned())
            .collect()
    }

    #[test]
    fn test_condition() {
        let src = r#"
            📌("Health", value: 40);
            ⚓("Low", condition: λ(ctx.Health < 50)) { 🚀("Regenerate"); };
            ⚓("High", condition: λ(ctx.Health > 50)) { 🚀("Rest"); };
            📌("Done");
        "#;
        assert_eq!(visited(src), vec!["Health", "Regenerate", "Done"]);
    }

    #[test]
    fn test_missing_condition_is_open() {
        assert_eq!(visited(r#"⚓("Gate") { 📌("In"); }"#), vec!["In"]);
    }
}
