//! Config-directory bootstrapping against a throwaway home.

use assert_fs::prelude::*;
use figwatch_core::config::{self, DEFAULT_TEMPLATE};
use predicates::prelude::*;

#[test]
fn init_writes_template_under_dot_figwatch() {
    let home = assert_fs::TempDir::new().expect("tempdir");

    config::ensure_init_at(home.path()).expect("init");

    home.child(".figwatch").assert(predicate::path::is_dir());
    home.child(".figwatch/template.svg")
        .assert(predicate::str::contains("<svg"))
        .assert(DEFAULT_TEMPLATE);
}

#[test]
fn init_is_idempotent_and_preserves_customised_template() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".figwatch/template.svg")
        .write_str("<svg id=\"mine\"/>")
        .expect("seed template");

    config::ensure_init_at(home.path()).expect("first init");
    config::ensure_init_at(home.path()).expect("second init");

    home.child(".figwatch/template.svg").assert("<svg id=\"mine\"/>");
}

#[test]
fn template_path_is_pure() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::template_path(home.path());

    assert!(path.ends_with(".figwatch/template.svg"));
    home.child(".figwatch").assert(predicate::path::missing());
}
