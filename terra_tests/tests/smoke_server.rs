//! Smoke tests: the server loops run and shut down cleanly.

use std::time::Duration;

use terra_server::player::{Player, PlayerId};
use terra_server::server::bind_ephemeral;
use terra_server::session::{SessionHandle, Stage};
use terra_shared::config::ServerConfig;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_runs_and_shuts_down() -> anyhow::Result<()> {
    let cfg = ServerConfig {
        tick_delay_ms: 10.0,
        ..Default::default()
    };
    let (server, listener) = bind_ephemeral(cfg).await?;
    let handles = server.start(listener);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.is_running());

    server.shutdown();
    for handle in handles {
        handle.await?;
    }

    let released = server.terrain.lock().release_all();
    assert_eq!(released, 0, "no players connected, nothing generated");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worldgen_fills_interest_radius() -> anyhow::Result<()> {
    let cfg = ServerConfig {
        tick_delay_ms: 10.0,
        render_distance: 2,
        ..Default::default()
    };
    let (server, listener) = bind_ephemeral(cfg).await?;

    // A synthetic fully-connected player at the origin.
    let id = PlayerId(1);
    let (handle, _rx) = SessionHandle::new(id);
    handle.advance_stage(Stage::FullyConnected);
    server.with_players(|players| {
        players.insert(id, Player::new(id, handle, &server.cfg));
    });

    let handles = server.start(listener);
    tokio::time::sleep(Duration::from_millis(400)).await;

    let expected = (2 * server.cfg.render_distance + 1).pow(2) as usize;
    assert!(
        server.terrain.lock().len() >= expected,
        "world-gen loop should cover the interest radius"
    );

    server.shutdown();
    for handle in handles {
        handle.await?;
    }
    Ok(())
}
