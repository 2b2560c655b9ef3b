//! Sykli CI pipeline for the ExtendedDaemonSet controller
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin kulta-eds --bin gen-crd")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/kulta-eds")
        .output("gen-crd", "target/release/gen-crd")
        .after(&["test", "lint", "fmt"]);

    // Needs a kind cluster, so only on push
    let _ = p
        .task("integration-test")
        .container("ghcr.io/sykli/kind-runner:latest")
        .mount(&src, "/src")
        .workdir("/src")
        .run(
            r#"#!/bin/bash
set -e

kind create cluster --name eds-ci

./target/release/gen-crd > /tmp/eds-crds.json
kubectl apply -f /tmp/eds-crds.json
kubectl wait --for=condition=Established crd/extendeddaemonsets.eds.kulta.io --timeout=60s

RUST_LOG=info ./target/release/kulta-eds 2>&1 | tee /tmp/eds-log.txt &
EDS_PID=$!
sleep 5

kubectl create namespace demo || true

cat <<EOF | kubectl apply -f -
apiVersion: eds.kulta.io/v1alpha1
kind: ExtendedDaemonSet
metadata:
  name: node-agent
  namespace: demo
spec:
  template:
    metadata:
      labels:
        app: node-agent
    spec:
      containers:
      - name: agent
        image: busybox:1.36
        command: ["sleep", "infinity"]
EOF

sleep 15

ACTIVE=$(kubectl get extendeddaemonset node-agent -n demo -o jsonpath='{.status.activeReplicaSet}')
if [ -z "$ACTIVE" ]; then
  echo "ERROR: no active replica set recorded"
  cat /tmp/eds-log.txt
  exit 1
fi

PODS=$(kubectl get pods -n demo -l eds.kulta.io/replicaset=$ACTIVE -o name | wc -l)
NODES=$(kubectl get nodes -o name | wc -l)
if [ "$PODS" != "$NODES" ]; then
  echo "ERROR: expected $NODES pods for $ACTIVE, got $PODS"
  cat /tmp/eds-log.txt
  exit 1
fi

echo "Integration tests passed"

kill $EDS_PID || true
kind delete cluster --name eds-ci || true
"#,
        )
        .input_from("build", "binary", "/src/target/release/kulta-eds")
        .input_from("build", "gen-crd", "/src/target/release/gen-crd")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(600);

    p.emit();
}
