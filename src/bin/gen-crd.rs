use kube::CustomResourceExt;
use kulta_eds::crd::daemonset::ExtendedDaemonSet;
use kulta_eds::crd::replicaset::ExtendedDaemonSetReplicaSet;
use kulta_eds::crd::setting::ExtendedDaemonSetSetting;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    // Emits the three CRDs as one v1 List, ready for `kubectl apply -f -`.
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"
    // to convert to YAML
    let list = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            serde_json::to_value(ExtendedDaemonSet::crd())?,
            serde_json::to_value(ExtendedDaemonSetReplicaSet::crd())?,
            serde_json::to_value(ExtendedDaemonSetSetting::crd())?,
        ],
    });

    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}
