//! Integration tests for the hallucination checks.
//!
//! These run the full pipeline (markdown extraction, Python analysis,
//! normalization and registry lookups) against the fixtures in testdata.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use hallulib::{Checker, GroundTruth, HalluError, HallucinationLevel};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn ground_truth() -> GroundTruth {
    let libraries = testdata_path().join("libraries");
    GroundTruth::with_paths(
        libraries.join("pypi_data.json"),
        libraries.join("documentation.json"),
    )
}

fn response(name: &str) -> String {
    let path = testdata_path().join("responses").join(name);
    fs::read_to_string(&path).expect("should read response fixture")
}

fn python(code: &str) -> String {
    format!("Sure, here is the code:\n\n```python\n{}\n```\n", code)
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_presence_and_usage() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python(
        "import numpy as np\nfrom pandas import DataFrame\nx = DataFrame(np.array([1, 2, 3]))",
    );

    assert_eq!(checker.check_library_presence(&resp, "numpy"), (true, true));
    assert_eq!(checker.check_library_presence(&resp, "pandas"), (true, true));
    assert_eq!(checker.check_library_presence(&resp, "matplotlib"), (false, false));
}

#[test]
fn test_imported_but_unused() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python("import matplotlib\nprint('plotting later')");

    assert_eq!(checker.check_library_presence(&resp, "matplotlib"), (true, false));
}

#[test]
fn test_install_only_mode() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = format!(
        "Install it with `pip install real_pkg`.\n\n{}",
        python("import other_pkg\nother_pkg.run()")
    );

    let installs_only = checker.check_unknown_libraries(&resp, true, None).unwrap();
    assert!(installs_only.is_empty());

    let all = checker.check_unknown_libraries(&resp, false, None).unwrap();
    assert_eq!(all, set(&["other_pkg"]));
}

#[test]
fn test_unknown_library_detection() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry.json");
    fs::write(
        &registry,
        r#"{"datetime": "2025-01-01T00:00:00", "data": ["numpy", "pandas"]}"#,
    )
    .unwrap();

    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python("import numpy\nimport os\nimport fakepkg123");

    let unknown = checker
        .check_unknown_libraries(&resp, false, Some(&registry))
        .unwrap();
    assert_eq!(unknown, set(&["fakepkg123"]));
}

#[test]
fn test_unknown_library_names_are_normalized() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = "Run this first:\n\n```bash\npip install Scikit-Learn Fake.Lib\n```\n";

    let unknown = checker.check_unknown_libraries(resp, false, None).unwrap();
    assert_eq!(unknown, set(&["fake_lib"]));
}

#[test]
fn test_member_detection() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);

    let valid = python("import numpy as np\nx = np.array([1, 2, 3])");
    assert!(checker.check_unknown_members(&valid, "numpy", None).unwrap().is_empty());

    let bogus = python("import numpy as np\nx = np.bogus_fn([1, 2, 3])");
    assert_eq!(
        checker.check_unknown_members(&bogus, "numpy", None).unwrap(),
        set(&["numpy.bogus_fn"])
    );
}

#[test]
fn test_member_path_trimmed_at_class() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python("import numpy\nresult = numpy.SomeClass.method_call()");

    assert_eq!(
        checker.check_unknown_members(&resp, "numpy", None).unwrap(),
        set(&["numpy.SomeClass"])
    );
}

#[test]
fn test_cross_library_isolation() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python(
        "import numpy as np\nimport pandas as pd\n\
         df = pd.DataFrame({'a': np.zeros(3)})\nz = pd.NotAThing()",
    );

    assert!(checker.check_unknown_members(&resp, "numpy", None).unwrap().is_empty());
    assert_eq!(
        checker.check_unknown_members(&resp, "pandas", None).unwrap(),
        set(&["pandas.NotAThing"])
    );
}

#[test]
fn test_library_with_extra_module_prefix() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python("from mpl_toolkits import hallucination");

    assert_eq!(
        checker.check_unknown_members(&resp, "matplotlib", None).unwrap(),
        set(&["mpl_toolkits.hallucination"])
    );
}

#[test]
fn test_undocumented_library_is_fatal() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = python("import requests\nrequests.get('https://example.com')");

    let err = checker.check_unknown_members(&resp, "requests", None).unwrap_err();
    assert_eq!(err.to_string(), "library not documented: requests");

    let err = checker.check_for_versions(&resp, "requests", None).unwrap_err();
    assert!(matches!(err, HalluError::NotDocumented(_)));
}

#[test]
fn test_version_citations() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);

    let versions = checker
        .check_for_versions(&response("fake_member.md"), "numpy", None)
        .unwrap();
    assert_eq!(versions, vec!["2.2.6"]);

    let in_code = python("import numpy as np\nassert np.__version__ == '2.2.6'");
    assert!(checker.check_for_versions(&in_code, "numpy", None).unwrap().is_empty());
}

#[test]
fn test_no_code_round_trip() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let resp = response("no_code.txt");

    assert!(!hallulib::contains_code(&resp));
    assert!(hallulib::extract_code_blocks(&resp).is_empty());
    assert_eq!(checker.check_library_presence(&resp, "numpy"), (false, false));
    assert!(checker.check_unknown_libraries(&resp, false, None).unwrap().is_empty());
    assert!(checker.check_unknown_members(&resp, "numpy", None).unwrap().is_empty());

    let report = checker.check(&resp, HallucinationLevel::Library, None).unwrap();
    assert!(!report.has_code);
    assert!(report.hallucinations.is_empty());

    let clean = checker
        .check(&response("clean.md"), HallucinationLevel::Library, None)
        .unwrap();
    assert!(clean.has_code);
    assert!(clean.hallucinations.is_empty());
}

#[test]
fn test_fixture_responses() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);

    let library = checker
        .check(&response("fake_library.md"), HallucinationLevel::Library, None)
        .unwrap();
    assert_eq!(library.hallucinations, vec!["fastjsonx"]);

    let member = checker
        .check(&response("fake_member.md"), HallucinationLevel::Member, Some("numpy"))
        .unwrap();
    assert_eq!(member.hallucinations, vec!["numpy.smart_inverse"]);
    assert_eq!(member.versions, vec!["2.2.6"]);

    let bare = checker
        .check(&response("bare_code.txt"), HallucinationLevel::Member, Some("pandas"))
        .unwrap();
    assert!(bare.has_code);
    assert_eq!(bare.hallucinations, vec!["pandas.read_excelish"]);
}

#[test]
fn test_cache_reuse_and_fresh_paths() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    fs::write(&first, r#"{"data": ["alpha"]}"#).unwrap();
    fs::write(&second, r#"{"data": ["beta"]}"#).unwrap();

    let gt = GroundTruth::new();
    let a = gt.load_known_libraries(Some(&first), true, true).unwrap();
    // Rewriting the file does not affect the cached load.
    fs::write(&first, r#"{"data": ["gamma"]}"#).unwrap();
    let b = gt.load_known_libraries(Some(&first), true, true).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(b.contains("alpha"));

    let c = gt.load_known_libraries(Some(&second), true, true).unwrap();
    assert!(c.contains("beta"));
    assert!(!c.contains("alpha"));

    gt.clear();
    let d = gt.load_known_libraries(Some(&first), true, true).unwrap();
    assert!(d.contains("gamma"));

    let (hits, misses) = gt.cache_stats();
    assert_eq!((hits, misses), (1, 3));
}

#[test]
fn test_checker_shared_across_threads() {
    let gt = ground_truth();
    let checker = Checker::new(&gt);
    let responses: Vec<String> = (0..8)
        .map(|i| python(&format!("import numpy\nimport fake_{}", i)))
        .collect();

    std::thread::scope(|s| {
        let handles: Vec<_> = responses
            .iter()
            .map(|resp| {
                let checker = &checker;
                s.spawn(move || checker.check_unknown_libraries(resp, false, None).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 1);
        }
    });
}

#[test]
fn test_filter_by_validity() {
    let gt = ground_truth();
    let names = ["numpy", "Flask", "notreal", "sys", "notreal"];

    let valid = gt.filter_by_validity(&names, true, None).unwrap();
    assert_eq!(valid, vec!["numpy", "flask", "sys"]);

    let invalid = gt.filter_by_validity(&names, false, None).unwrap();
    assert_eq!(invalid, vec!["notreal"]);
}
