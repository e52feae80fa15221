//! Integration tests for `dnpkit resolve`.
//!
//! These tests write a directory registry and an installed snapshot to a
//! temp dir and check the JSON plan printed by the binary.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "dnpkit-cli", "--bin", "dnpkit", "--"]);
    cmd.env_remove("DNPKIT_REGISTRY");
    cmd
}

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Registry with nginx-proxy, its dependency, the web/letsencrypt pair that
/// depends on it and the orchestrator.
fn setup_registry() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry");
    std::fs::create_dir_all(&registry).unwrap();

    write_json(
        &registry.join("nginx-proxy.dnp.dappnode.eth.json"),
        &serde_json::json!({
            "name": "nginx-proxy.dnp.dappnode.eth",
            "dist-tags": { "latest": "0.1.0" },
            "versions": {
                "0.1.0": {
                    "dependencies": {
                        "dependency.dnp.dappnode.eth": "^0.1.1",
                        "dappmanager.dnp.dappnode.eth": "^0.2.0"
                    }
                }
            }
        }),
    );
    write_json(
        &registry.join("dependency.dnp.dappnode.eth.json"),
        &serde_json::json!({
            "dist-tags": { "latest": "0.1.2" },
            "versions": { "0.1.1": {}, "0.1.2": {} }
        }),
    );
    write_json(
        &registry.join("dappmanager.dnp.dappnode.eth.json"),
        &serde_json::json!({
            "dist-tags": { "latest": "0.2.3" },
            "versions": { "0.2.3": {} }
        }),
    );
    write_json(
        &registry.join("web.dnp.dappnode.eth.json"),
        &serde_json::json!({
            "dist-tags": { "latest": "0.0.0" },
            "versions": {
                "0.0.0": {
                    "dependencies": {
                        "nginx-proxy.dnp.dappnode.eth": "latest",
                        "letsencrypt-nginx.dnp.dappnode.eth": "latest"
                    }
                }
            }
        }),
    );
    write_json(
        &registry.join("letsencrypt-nginx.dnp.dappnode.eth.json"),
        &serde_json::json!({
            "dist-tags": { "latest": "0.0.4" },
            "versions": {
                "0.0.4": {
                    "dependencies": { "web.dnp.dappnode.eth": "latest" },
                    "origin": "/ipfs/Qm1234"
                }
            }
        }),
    );

    write_json(
        &dir.path().join("installed.json"),
        &serde_json::json!([
            {
                "name": "web.dnp.dappnode.eth",
                "version": "0.0.0",
                "dependencies": {
                    "nginx-proxy.dnp.dappnode.eth": "latest",
                    "letsencrypt-nginx.dnp.dappnode.eth": "latest"
                }
            },
            {
                "name": "letsencrypt-nginx.dnp.dappnode.eth",
                "version": "0.0.4",
                "origin": "/ipfs/Qm1234",
                "dependencies": { "web.dnp.dappnode.eth": "latest" }
            },
            { "name": "vpn.dnp.dappnode.eth", "version": "0.1.0" }
        ]),
    );

    dir
}

fn run_json(dir: &Path, args: &[&str]) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(["resolve", "--json", "--cwd"])
        .arg(dir)
        .args(args)
        .output()
        .expect("Failed to run dnpkit");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("Invalid JSON output: {e}\nstdout: {stdout}"));
    (output.status.success(), value)
}

#[test]
fn test_resolve_json_plan() {
    let dir = setup_registry();
    let (success, json) = run_json(
        dir.path(),
        &[
            "nginx-proxy.dnp.dappnode.eth@^0.1.0",
            "--registry",
            "registry",
            "--installed",
            "installed.json",
        ],
    );

    assert!(success);
    assert_eq!(json["ok"], true);

    let plan = json["plan"].as_array().unwrap();
    let names: Vec<&str> = plan.iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "dependency.dnp.dappnode.eth",
            "nginx-proxy.dnp.dappnode.eth",
            "letsencrypt-nginx.dnp.dappnode.eth",
            "web.dnp.dappnode.eth",
            "dappmanager.dnp.dappnode.eth",
        ]
    );

    let entry = |name: &str| plan.iter().find(|e| e["name"] == name).unwrap().clone();
    assert_eq!(entry("dependency.dnp.dappnode.eth")["target_version"], "0.1.2");
    assert_eq!(entry("nginx-proxy.dnp.dappnode.eth")["needs_install"], true);
    assert_eq!(entry("web.dnp.dappnode.eth")["needs_install"], false);
    assert_eq!(entry("letsencrypt-nginx.dnp.dappnode.eth")["needs_install"], false);
    assert_eq!(entry("dappmanager.dnp.dappnode.eth")["order"], 4);

    // vpn does not depend on nginx-proxy
    assert!(!names.contains(&"vpn.dnp.dappnode.eth"));
}

#[test]
fn test_resolve_without_installed_snapshot() {
    let dir = setup_registry();
    let (success, json) = run_json(
        dir.path(),
        &["dependency.dnp.dappnode.eth", "--registry", "registry"],
    );

    assert!(success);
    let plan = json["plan"].as_array().unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0]["target_version"], "0.1.2");
    assert_eq!(plan[0]["needs_install"], true);
}

#[test]
fn test_resolve_invalid_request() {
    let dir = setup_registry();
    let (success, json) = run_json(dir.path(), &["Not A Name@^1.0.0", "--registry", "registry"]);

    assert!(!success);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "DNP_REQUEST_INVALID");
}

#[test]
fn test_resolve_unsatisfiable() {
    let dir = setup_registry();
    let (success, json) = run_json(
        dir.path(),
        &["dependency.dnp.dappnode.eth@^9.0.0", "--registry", "registry"],
    );

    assert!(!success);
    assert_eq!(json["error"]["code"], "DNP_UNSATISFIABLE");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("dependency.dnp.dappnode.eth"));
}

#[test]
fn test_resolve_missing_registry() {
    let dir = setup_registry();
    let (success, json) = run_json(dir.path(), &["dependency.dnp.dappnode.eth"]);

    assert!(!success);
    assert_eq!(json["error"]["code"], "DNP_REGISTRY_ERROR");
}

#[test]
fn test_resolve_bad_installed_file() {
    let dir = setup_registry();
    std::fs::write(dir.path().join("broken.json"), "{").unwrap();
    let (success, json) = run_json(
        dir.path(),
        &[
            "dependency.dnp.dappnode.eth",
            "--registry",
            "registry",
            "--installed",
            "broken.json",
        ],
    );

    assert!(!success);
    assert_eq!(json["error"]["code"], "DNP_INSTALLED_STATE_ERROR");
}

#[test]
fn test_resolve_custom_orchestrator() {
    let dir = setup_registry();
    write_json(
        &dir.path().join("dnpkit.json"),
        &serde_json::json!({ "orchestrator": "dependency.dnp.dappnode.eth" }),
    );
    let (success, json) = run_json(
        dir.path(),
        &[
            "nginx-proxy.dnp.dappnode.eth@0.1.0",
            "--registry",
            "registry",
            "--config",
            "dnpkit.json",
        ],
    );

    assert!(success);
    let plan = json["plan"].as_array().unwrap();
    assert_eq!(plan.last().unwrap()["name"], "dependency.dnp.dappnode.eth");
}

#[test]
fn test_version_command() {
    let output = cargo_bin().arg("version").output().expect("Failed to run dnpkit");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("dnpkit "));
}
