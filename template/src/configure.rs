use crate::config::{AgentConfig, MANAGEMENT, MANAGEMENT_IP, MANAGEMENT_PORTS};
use crate::error::TemplateError;
use crate::runtime::ContainerRuntime;
use crate::trust::Keyring;
use std::collections::HashMap;
use strata_registry::Registry;
use strata_snapshot::SnapshotStore;

/// Locally-administered MAC in the fixed container prefix.
pub fn random_mac() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    format!("00:16:3e:{:02x}:{:02x}:{:02x}", bytes[13], bytes[14], bytes[15])
}

/// Default container configuration applied to a freshly deployed
/// generic template.
pub async fn set_default_config(
    runtime: &dyn ContainerRuntime,
    config: &AgentConfig,
    id: &str,
) -> Result<(), TemplateError> {
    let home = config.template_dir(id);
    let share = config.app_prefix.join("share/lxc/config");

    let entries = vec![
        ("lxc.rootfs".to_string(), format!("{}/rootfs", home.display())),
        (
            "lxc.rootfs.mount".to_string(),
            format!("{}/rootfs", home.display()),
        ),
        ("lxc.mount".to_string(), format!("{}/fstab", home.display())),
        ("lxc.hook.pre-start".to_string(), String::new()),
        (
            "lxc.include".to_string(),
            format!("{}/ubuntu.common.conf", share.display()),
        ),
        (
            "lxc.include".to_string(),
            format!("{}/ubuntu.userns.conf", share.display()),
        ),
        (
            "strata.config.path".to_string(),
            config.app_prefix.join("etc").display().to_string(),
        ),
        (
            "lxc.network.script.up".to_string(),
            config.app_prefix.join("bin/create_ovs_interface").display().to_string(),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/home home none bind,rw 0 0", home.display()),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/opt opt none bind,rw 0 0", home.display()),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/var var none bind,rw 0 0", home.display()),
        ),
    ];

    runtime.set_config(id, &entries).await?;
    Ok(())
}

/// One-time bootstrap of the control-plane container after deploying
/// the management template.
pub async fn management_init(
    snapshots: &dyn SnapshotStore,
    runtime: &dyn ContainerRuntime,
    keyring: &dyn Keyring,
    config: &AgentConfig,
    id: &str,
) -> Result<(), TemplateError> {
    snapshots.set_readonly(id, false).await?;
    runtime.set_uid_map(MANAGEMENT).await?;

    let home = config.template_dir(id);
    let entries = vec![
        ("lxc.network.hwaddr".to_string(), random_mac()),
        ("lxc.network.veth.pair".to_string(), MANAGEMENT.to_string()),
        (
            "lxc.network.script.up".to_string(),
            config.app_prefix.join("bin/create_ovs_interface").display().to_string(),
        ),
        ("lxc.network.link".to_string(), String::new()),
        ("lxc.mount".to_string(), format!("{}/fstab", home.display())),
        ("lxc.rootfs".to_string(), format!("{}/rootfs", home.display())),
        (
            "lxc.rootfs.mount".to_string(),
            format!("{}/rootfs", home.display()),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/home home none bind,rw 0 0", home.display()),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/opt opt none bind,rw 0 0", home.display()),
        ),
        (
            "lxc.mount.entry".to_string(),
            format!("{}/var var none bind,rw 0 0", home.display()),
        ),
    ];
    runtime.set_config(MANAGEMENT, &entries).await?;

    keyring.generate_key(MANAGEMENT).await?;

    for port in MANAGEMENT_PORTS {
        let internal = format!("{}:{}", MANAGEMENT_IP, port);
        if let Err(e) = runtime.map_port("tcp", &internal, port).await {
            tracing::warn!("Failed to expose port {}: {}", port, e);
        }
    }

    let mut registry = Registry::open(&config.registry_path).await?;
    registry.add_container(
        MANAGEMENT,
        HashMap::from([("ip".to_string(), MANAGEMENT_IP.to_string())]),
    );
    registry.close().await?;

    runtime.start(MANAGEMENT).await?;

    tracing::info!("Management console will shortly be available on port 8443");
    Ok(())
}
