//! Shared runner for the keyword corpus tests.
use json_validator::{schema, validator};
use serde_json::Value;

/// run_cases executes canonical-suite-style case groups: an array of
/// `{description, schema, tests: [{description, data, valid}]}` objects.
/// Every schema must compile cleanly, and every test verdict must agree
/// with the validator.
pub fn run_cases(cases: Value) {
    let cases = cases.as_array().expect("cases are not an array");

    for case in cases {
        let desc = case
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("<no description>");
        let schema_doc = case.get("schema").expect("missing case schema");

        let compiled = schema::compile(schema_doc);
        assert!(
            compiled.ok(),
            "schema of '{}' failed to compile: {:?}",
            desc,
            compiled.errors
        );

        let tests = case
            .get("tests")
            .expect("missing case tests")
            .as_array()
            .expect("tests are not an array");

        for test in tests {
            let test_desc = test
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("<no description>");
            let data = test.get("data").expect("missing test data");
            let valid = test
                .get("valid")
                .and_then(Value::as_bool)
                .expect("missing test verdict");

            let outcome = validator::validate(&compiled.tree, data);
            assert_eq!(
                outcome.valid,
                valid,
                "'{}' / '{}': expected {} to be {}; errors: {:?}",
                desc,
                test_desc,
                data,
                if valid { "valid" } else { "invalid" },
                outcome.errors,
            );
        }
    }
}
