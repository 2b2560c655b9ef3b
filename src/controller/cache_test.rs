use super::*;
use crate::controller::fixtures::{labels, node, pod, ts};
use crate::crd::setting::ExtendedDaemonSetSettingSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::runtime::reflector::store::Writer;
use std::time::Duration;

fn filled<K>(items: Vec<K>) -> (Store<K>, Writer<K>)
where
    K: kube::Resource + Clone + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, mut writer) = reflector::store();
    for item in items {
        writer.apply_watcher_event(&watcher::Event::Apply(item));
    }
    (reader, writer)
}

fn setting(name: &str, namespace: &str) -> ExtendedDaemonSetSetting {
    let mut setting = ExtendedDaemonSetSetting::new(
        name,
        ExtendedDaemonSetSettingSpec {
            reference: "agent".to_string(),
            node_selector: LabelSelector::default(),
            containers: vec![],
        },
    );
    setting.metadata.namespace = Some(namespace.to_string());
    setting
}

fn names<K: kube::Resource>(items: &[K]) -> Vec<String> {
    let mut names: Vec<String> = items.iter().map(|i| i.name_any()).collect();
    names.sort();
    names
}

#[test]
fn test_reads_come_from_the_caches() {
    let start = ts("2024-01-01T00:00:00Z");
    let mut other_eds = pod("other-1", "node-1", "h1", start);
    other_eds.metadata.labels = Some(labels(&[(LABEL_EDS_NAME, "other")]));
    let mut other_namespace = pod("agent-elsewhere", "node-1", "h1", start);
    other_namespace.metadata.namespace = Some("kube-system".to_string());

    let (nodes, _nw) = filled(vec![node("node-1", &[]), node("node-2", &[])]);
    let (pods, _pw) = filled(vec![
        pod("agent-1", "node-1", "h1", start),
        pod("agent-2", "node-2", "h1", start),
        other_eds,
        other_namespace,
    ]);
    let (settings, _sw) = filled(vec![
        setting("agent-large", "default"),
        setting("agent-small", "kube-system"),
    ]);
    let caches = ReadCaches::new(nodes, pods, settings);

    assert_eq!(names(&caches.nodes()), vec!["node-1", "node-2"]);
    assert_eq!(names(&caches.pods("default", "agent")), vec!["agent-1", "agent-2"]);
    assert_eq!(names(&caches.pods("default", "other")), vec!["other-1"]);
    assert_eq!(names(&caches.settings("default")), vec!["agent-large"]);
}

#[test]
fn test_deleted_objects_leave_the_cache() {
    let (nodes, mut writer) = filled(vec![node("node-1", &[]), node("node-2", &[])]);
    writer.apply_watcher_event(&watcher::Event::Delete(node("node-2", &[])));
    let (pods, _pw) = filled(Vec::<Pod>::new());
    let (settings, _sw) = filled(Vec::<ExtendedDaemonSetSetting>::new());
    let caches = ReadCaches::new(nodes, pods, settings);

    assert_eq!(names(&caches.nodes()), vec!["node-1"]);
}

#[tokio::test]
async fn test_ready_once_every_initial_list_is_done() {
    let (nodes, mut nw) = reflector::store::<Node>();
    let (pods, mut pw) = reflector::store::<Pod>();
    let (settings, mut sw) = reflector::store::<ExtendedDaemonSetSetting>();
    let caches = ReadCaches::new(nodes, pods, settings);

    nw.apply_watcher_event(&watcher::Event::Init);
    nw.apply_watcher_event(&watcher::Event::InitApply(node("node-1", &[])));
    nw.apply_watcher_event(&watcher::Event::InitDone);
    pw.apply_watcher_event(&watcher::Event::Init);
    pw.apply_watcher_event(&watcher::Event::InitDone);

    let pending = tokio::time::timeout(Duration::from_millis(50), caches.wait_until_ready()).await;
    assert!(pending.is_err(), "settings have not finished listing");

    sw.apply_watcher_event(&watcher::Event::Init);
    sw.apply_watcher_event(&watcher::Event::InitDone);

    let ready = tokio::time::timeout(Duration::from_secs(1), caches.wait_until_ready()).await;
    assert!(matches!(ready, Ok(Ok(()))));
    assert_eq!(names(&caches.nodes()), vec!["node-1"]);
}
