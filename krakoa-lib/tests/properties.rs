use proptest::prelude::*;

use krakoa_lib::compiler::{compile, linker, resolver};
use krakoa_lib::core::*;
use krakoa_lib::vm::Runtime;

const GLYPHS: &[&str] = &["👤", "📌", "🧠", "📦", "➔", "⚓", "🔗", "💬", "🧪"];
const NAMES: &[&str] = &["Wade", "Logan", "Health", "Armor", "Kitty", "Blade"];

fn leaf() -> impl Strategy<Value = Node> {
    (
        prop::sample::select(GLYPHS),
        prop::option::of(prop::sample::select(NAMES)),
        prop::sample::select(NAMES),
        prop::collection::vec(prop::sample::select(NAMES), 0..3),
        any::<u8>(),
    )
        .prop_map(|(glyph, id, mood, hashtags, level)| {
            let node = Node::new(OpCode::from_glyph(glyph))
                .with_param("mood", mood)
                .with_param("level", level as f64)
                .with_tags(hashtags.into_iter().map(Tag::hashtag).collect());
            match id {
                Some(id) => node.with_id(id),
                None => node,
            }
        })
}

fn forest() -> impl Strategy<Value = Vec<Node>> {
    let node = leaf().prop_recursive(3, 24, 4, |inner| {
        (leaf(), prop::collection::vec(inner, 0..4)).prop_map(|(node, body)| node.with_body(body))
    });
    prop::collection::vec(node, 0..5)
}

fn count(forest: &[Node]) -> usize {
    forest.iter().map(Node::span).sum()
}

fn answers_anywhere(forest: &[Node], name: &str) -> bool {
    forest
        .iter()
        .any(|n| n.answers_to(name) || answers_anywhere(&n.body, name))
}

proptest! {
    #[test]
    fn addresses_are_dense(forest in forest()) {
        let prog = compile(&forest).unwrap();
        prop_assert_eq!(prog.len(), count(&forest));
        prop_assert!(prog.code.keys().copied().eq(0..prog.len()));
        prop_assert!(prog.validate().is_ok());
    }

    #[test]
    fn next_has_the_right_arity(forest in forest()) {
        let prog = compile(&forest).unwrap();
        for instr in prog.code.values() {
            let arity = if instr.op.is_branching() { 2 } else { 1 };
            prop_assert_eq!(instr.next.len(), arity);
        }
    }

    #[test]
    fn pooling_round_trips(forest in forest()) {
        let prog = compile(&forest).unwrap();
        let rt = Runtime::new(prog.clone());
        let decoded: Vec<Instruction> = (0..prog.len())
            .map(|addr| rt.decode(addr as Address).unwrap().instr)
            .collect();

        // every string survives the pool
        let mut flat = vec![];
        let mut stack: Vec<&Node> = forest.iter().rev().collect();
        while let Some(node) = stack.pop() {
            flat.push(node);
            stack.extend(node.body.iter().rev());
        }
        for (instr, node) in decoded.iter().zip(&flat) {
            prop_assert_eq!(&instr.params, &node.params);
            prop_assert_eq!(instr.id.as_deref(), node.id());
        }

        // and pooling again changes nothing
        let (text, code) = linker::pool(decoded);
        prop_assert_eq!(text, prog.text);
        prop_assert_eq!(code, prog.code);
    }

    #[test]
    fn programs_round_trip_through_json(forest in forest()) {
        let prog = compile(&forest).unwrap();
        let json = prog.to_json().unwrap();
        prop_assert_eq!(Program::from_json(&json).unwrap(), prog);
    }

    #[test]
    fn verification_matches_existence(forest in forest(), name in prop::sample::select(NAMES)) {
        prop_assert_eq!(resolver::verify(&[name], &forest), answers_anywhere(&forest, name));
        prop_assert!(!resolver::verify(&[name, "Nobody"], &forest));
    }

    #[test]
    fn hashtags_never_fail_compilation(forest in forest()) {
        let prog = compile(&forest).unwrap();
        let rt = Runtime::new(prog.clone());
        for address in 0..prog.len() {
            let instr = rt.decode(address as Address).unwrap().instr;
            for tag in &instr.tags {
                // the root is defined at least by the carrier itself
                prop_assert!(tag.is_resolved());
                let carrier = rt.decode(tag.address).unwrap().instr;
                prop_assert!(
                    carrier.id.as_deref() == Some(tag.root.as_str())
                        || carrier.tags.iter().any(|t| t.root == tag.root)
                );
            }
        }
    }
}
