use std::collections::BTreeMap;

use kiln_ast::span::SourceRange;
use kiln_types::{ErrorInfo, ErrorKind, EvalReport, Shape, Tree, Variable};

fn one_shape_report() -> (EvalReport, Tree) {
    let v = Tree::var();
    let sphere = (Tree::x().square() + Tree::y().square() + Tree::z().square()).sqrt() - v.clone();
    let mut variables = BTreeMap::new();
    variables.insert(
        v.id(),
        Variable {
            id: v.id(),
            value: 2.0,
            range: SourceRange::new(0, 0, 10, 13),
        },
    );
    let report = EvalReport::Output {
        result: Some("#<shape>".to_string()),
        shapes: vec![Shape::new(sphere, variables.clone())],
        variables,
    };
    (report, v)
}

#[test]
fn output_accessors() {
    let (report, v) = one_shape_report();
    assert!(report.is_ok());
    assert!(report.errors().is_empty());
    assert_eq!(report.shapes().len(), 1);
    let vars = report.variables().expect("output report");
    assert_eq!(vars[&v.id()].value, 2.0);
}

#[test]
fn shape_variables_cover_its_tree() {
    let (report, _) = one_shape_report();
    for shape in report.shapes() {
        for id in shape.tree.vars() {
            assert!(report.variables().unwrap().contains_key(&id));
            assert!(shape.variables.contains_key(&id));
        }
        assert_eq!(shape.tree_id, shape.tree.id());
    }
}

#[test]
fn error_report_has_no_output() {
    let report = EvalReport::Errors {
        errors: vec![ErrorInfo {
            kind: ErrorKind::SyntaxError,
            message: "syntax-error: missing close paren in form (sphere".to_string(),
            stack_trace: String::new(),
            range: SourceRange::new(0, 0, 0, 7),
            function_name: None,
        }],
    };
    assert!(!report.is_ok());
    assert!(report.shapes().is_empty());
    assert!(report.variables().is_none());
    assert_eq!(
        report.errors()[0].to_string(),
        "0:0-0:7: syntax-error: missing close paren in form (sphere"
    );
}

#[cfg(feature = "serde")]
#[test]
fn report_serializes_with_status_tag() {
    let (report, v) = one_shape_report();
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["status"], "output");
    let key = v.id().0.to_string();
    assert_eq!(json["variables"][&key]["value"], 2.0);
    assert!(json["shapes"][0]["tree"].as_str().unwrap().contains("sqrt"));
}
