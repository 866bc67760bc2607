mod common;

use common::{config, eventually, Farm};
use futures::SinkExt;
use simfarm_manager::acceptor::bind_listener;
use simfarm_manager::{DispatchOrder, LoopState};
use simfarm_protocol::{Message, MessageCodec};
use simfarm_slave::{EchoRunner, Slave, SlaveConfig};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[tokio::test]
async fn test_tcp_slave_registers_and_runs_job() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, 3_600_000));
    let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    farm.manager.start_acceptor(listener);
    farm.manager.start_engine();

    let slave = Arc::new(Slave::new(
        &SlaveConfig {
            slave_name: Some("tcp-node".to_string()),
            ..Default::default()
        },
        Arc::new(EchoRunner),
    ));
    let connected = slave.clone();
    tokio::spawn(async move { connected.connect(&addr).await });

    let pool = farm.manager.pool();
    eventually(|| pool.registered_count() == 1).await;

    farm.manager.submit(farm.job("spi", None)).await.unwrap();
    let done = farm.completions(1).await;
    assert!(done[0].ends_with("spi"));
    eventually(|| slave.jobs_run() == 1).await;

    assert_eq!(farm.manager.loop_states()["acceptor"], LoopState::Running);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_bad_handshake_stops_acceptor() {
    let farm = Farm::new(config(DispatchOrder::Fifo, 3_600_000));
    let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    farm.manager.start_acceptor(listener);

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, MessageCodec::default());
    framed.send(Message::Keepalive).await.unwrap();

    let manager = farm.manager.clone();
    eventually(|| matches!(manager.loop_states()["acceptor"], LoopState::Failed(_))).await;
    assert_eq!(farm.manager.pool().registered_count(), 0);

    let health = farm.manager.stats();
    assert!(matches!(health.loops["acceptor"], LoopState::Failed(_)));
}
