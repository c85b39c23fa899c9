use clap::Args;
use color_eyre::eyre::Result;
use ironfly_common::{Event, LocalLinkConnection, NodeRecord, Port, ProvisionRequest};
use ironfly_conductor::{Conductor, Config, FakePowerDriver};
use ironfly_dhcp::PxeConfig;
use ironfly_network::{InMemoryNetworkController, NetworkPort};
use ironfly_store::{MemoryStore, SharedStore, Store};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of network ports on the demo node
    #[arg(long, default_value_t = 2)]
    pub ports: u8,
}

fn demo_config() -> Config {
    let mut config = Config::default();
    config.conductor.host = "demo-conductor".to_string();
    config.network = config
        .network
        .with_provider("neutron_plugin")
        .with_provisioning_network("provisioning")
        .with_cleaning_network("cleaning");
    config.pxe = PxeConfig::new(Ipv4Addr::new(10, 0, 0, 5));
    config
}

pub async fn run(args: DemoArgs) -> Result<()> {
    let config = demo_config();
    let store: SharedStore = Arc::new(MemoryStore::new());
    let controller = Arc::new(InMemoryNetworkController::new());
    let power = Arc::new(FakePowerDriver::new());

    let node = store
        .create_node(
            NodeRecord::new("pxe_ipmitool")
                .with_name("demo-node")
                .with_instance(Uuid::new_v4()),
        )
        .await?;
    for i in 1..=args.ports {
        let mac = format!("52:54:00:12:34:{:02x}", i);
        let vif = format!("tenant-{}", i);
        store
            .create_port(
                Port::new(node.uuid, &mac)
                    .with_local_link(LocalLinkConnection::new("0a:1b:2c:3d:4e:5f", format!("Ethernet1/{}", i)))
                    .with_vif(vif.clone()),
            )
            .await?;
        controller.seed_port(NetworkPort {
            id: vif,
            network_id: "tenant".to_string(),
            mac_address: mac,
            ..Default::default()
        });
    }
    info!(node = %node.uuid, ports = args.ports, "Enrolled demo node");

    let conductor = Conductor::from_config(&config, store.clone(), controller.clone(), power);
    let ident = node.uuid.to_string();
    report(&store, &ident, "enrolled").await?;

    conductor
        .do_provisioning_action(&ident, &ProvisionRequest::new("manage"))
        .await?;
    let mut task = conductor.tasks().acquire_exclusive(&ident, "verify").await?;
    task.process_event(Event::Done)?;
    task.save_node().await?;
    task.release().await?;
    report(&store, &ident, "manage").await?;

    conductor
        .do_provisioning_action(&ident, &ProvisionRequest::new("provide"))
        .await?;
    clean(&conductor, &ident).await?;
    report(&store, &ident, "provide").await?;

    conductor
        .do_provisioning_action(&ident, &ProvisionRequest::new("active"))
        .await?;
    let mut task = conductor.tasks().acquire_exclusive(&ident, "deploy").await?;
    conductor.prepare_deploy(&mut task).await?;
    println!(
        "{:<12} {} provisioning port(s) attached",
        "",
        controller.ports_on("provisioning").len()
    );
    conductor.finish_deploy(&mut task).await?;
    task.release().await?;
    report(&store, &ident, "deploy").await?;

    conductor
        .do_provisioning_action(&ident, &ProvisionRequest::new("deleted"))
        .await?;
    let mut task = conductor.tasks().acquire_exclusive(&ident, "tear down").await?;
    conductor.tear_down(&mut task).await?;
    conductor.clean_up(&task).await?;
    task.process_event(Event::Clean)?;
    task.save_node().await?;
    task.release().await?;
    clean(&conductor, &ident).await?;
    report(&store, &ident, "tear down").await?;

    Ok(())
}

/// Run a node in `cleaning` through the cleaning network and back to `available`.
async fn clean(conductor: &Conductor, ident: &str) -> Result<()> {
    let mut task = conductor.tasks().acquire_exclusive(ident, "cleaning").await?;
    conductor.prepare_cleaning(&mut task).await?;
    task.process_event(Event::Wait)?;
    task.save_node().await?;
    task.release().await?;

    let mut task = conductor.tasks().acquire_exclusive(ident, "cleaning").await?;
    task.process_event(Event::Resume)?;
    conductor.tear_down_cleaning(&mut task).await?;
    task.process_event(Event::Done)?;
    task.save_node().await?;
    task.release().await?;
    Ok(())
}

async fn report(store: &SharedStore, ident: &str, step: &str) -> Result<()> {
    let node = store.get_node(ident).await?;
    let power = node.power_state.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
    println!("{:<12} {:<12} {}", step, node.provision_state.as_str(), power);
    Ok(())
}
