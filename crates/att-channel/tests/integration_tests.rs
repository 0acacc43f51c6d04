//! Integration tests for the dynamic attenuation channel
//!
//! These tests drive the channel through a real FIFO with the client library
//! on the writer side:
//! - Query results for the reference scenarios
//! - Broadcast, pairwise and reset commands arriving mid-run
//! - Fatal stream errors and lifecycle misuse
//! - The background reader variant and its sentinel shutdown

use att_channel::{
    AttenuationChannel, BackgroundChannel, ChannelConfig, ChannelController, ChannelError,
    ChannelState, PairUpdate,
};
use att_client::AttenuationClient;
use att_protocol::{CommandKind, Header, ProtocolError};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use super::*;

    pub const SIM_ID: &str = "itest";

    pub fn config(root: &Path) -> ChannelConfig {
        ChannelConfig::new(SIM_ID).with_com_root(root)
    }

    /// Open a controller for `n` devices under a fresh temp root
    pub fn controller(root: &Path, n: usize) -> ChannelController {
        ChannelController::open(config(root), n).unwrap()
    }

    /// Connect a client for `device` to the channel under `root`
    pub fn client(root: &Path, device: u16) -> AttenuationClient {
        AttenuationClient::open(root, SIM_ID, device, None).unwrap()
    }

    /// Query with every device active
    pub fn query_all(
        channel: &mut dyn AttenuationChannel,
        n: usize,
        rx: usize,
    ) -> Result<Vec<f64>, ChannelError> {
        let mut att = vec![f64::NAN; n];
        let isi = channel.calc(&vec![true; n], rx, &mut att)?;
        assert_eq!(isi, 100.0);
        Ok(att)
    }

    /// Poll `cond` until it holds or two seconds pass
    pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }
}

use helpers::*;

// ============================================================================
// Query Scenarios
// ============================================================================

mod scenario_tests {
    use super::*;

    #[test]
    fn test_default_attenuation_for_active_transmitters() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 4);

        let mut att = [0.0; 4];
        let isi = channel
            .calc(&[false, true, true, false], 2, &mut att)
            .unwrap();

        assert_eq!(isi, 100.0);
        assert_eq!(att[1], 60.0);
        assert_eq!(att[2], 60.0);
    }

    #[test]
    fn test_set_all_isolates_device() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 4);
        let mut client = client(root.path(), 2);

        assert!(client.set_attenuation_all(100.0).unwrap());

        assert_eq!(query_all(&mut channel, 4, 2).unwrap(), vec![100.0; 4]);
        // Device 2 as a transmitter, seen from elsewhere
        assert_eq!(query_all(&mut channel, 4, 0).unwrap()[2], 100.0);
        // Path between two other devices is untouched
        assert_eq!(query_all(&mut channel, 4, 0).unwrap()[1], 60.0);
    }

    #[test]
    fn test_payload_size_mismatch_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 4);
        let mut client = client(root.path(), 0);

        let header = Header {
            command: CommandKind::SetAttenuationAll.code(),
            payload_size: 5,
        };
        assert!(client.send_raw(&header.to_bytes()).unwrap());

        let err = query_all(&mut channel, 4, 0).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Protocol(ProtocolError::PayloadSizeMismatch {
                kind: CommandKind::SetAttenuationAll,
                expected: 10,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_reset_mid_run() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 3);
        let mut client = client(root.path(), 1);

        client.set_attenuation_all(10.0).unwrap();
        assert_eq!(query_all(&mut channel, 3, 0).unwrap()[1], 10.0);

        client.reset().unwrap();
        for rx in 0..3 {
            assert_eq!(query_all(&mut channel, 3, rx).unwrap(), vec![60.0; 3]);
        }
    }
}

// ============================================================================
// Command Semantics
// ============================================================================

mod command_tests {
    use super::*;

    #[test]
    fn test_set_one_writes_tx_both_ways() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 4);
        let mut client = client(root.path(), 1);

        client.set_attenuation_one(3, 5.0, 9.0).unwrap();

        assert_eq!(query_all(&mut channel, 4, 3).unwrap()[1], 9.0);
        assert_eq!(query_all(&mut channel, 4, 1).unwrap()[3], 9.0);
        assert_eq!(query_all(&mut channel, 4, 1).unwrap()[2], 60.0);
    }

    #[test]
    fn test_set_one_directional() {
        let root = tempfile::tempdir().unwrap();
        let config = helpers::config(root.path()).with_pair_update(PairUpdate::Directional);
        let mut channel = ChannelController::open(config, 4).unwrap();
        let mut client = client(root.path(), 1);

        client.set_attenuation_one(3, 5.0, 9.0).unwrap();

        assert_eq!(query_all(&mut channel, 4, 3).unwrap()[1], 9.0);
        assert_eq!(query_all(&mut channel, 4, 1).unwrap()[3], 5.0);
    }

    #[test]
    fn test_commands_apply_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 3);
        let mut a = client(root.path(), 0);
        let mut b = client(root.path(), 2);

        a.set_attenuation_all(20.0).unwrap();
        b.set_attenuation_one(0, 0.0, 35.0).unwrap();
        a.set_attenuation_all(25.0).unwrap();

        assert_eq!(channel.poll_commands().unwrap(), 3);
        assert_eq!(channel.lookup(0, 2), Some(25.0));
        assert_eq!(channel.lookup(2, 0), Some(25.0));
        assert_eq!(channel.lookup(1, 2), Some(60.0));
    }

    #[test]
    fn test_unknown_command_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 3);
        let mut client = client(root.path(), 1);

        let mut packet = Header {
            command: 7,
            payload_size: 3,
        }
        .to_bytes()
        .to_vec();
        packet.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        client.send_raw(&packet).unwrap();
        client.set_attenuation_all(42.0).unwrap();

        assert_eq!(query_all(&mut channel, 3, 0).unwrap()[1], 42.0);
    }

    #[test]
    fn test_out_of_range_device_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 4);
        let mut client = client(root.path(), 9);

        client.set_attenuation_all(10.0).unwrap();

        assert!(matches!(
            query_all(&mut channel, 4, 0),
            Err(ChannelError::OutOfRangeDevice {
                device: 9,
                num_devices: 4
            })
        ));
        // Matrix left as it was
        assert_eq!(channel.lookup(0, 1), Some(60.0));
    }

    #[test]
    fn test_clients_may_reconnect() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 2);

        {
            let mut first = client(root.path(), 0);
            first.set_attenuation_all(1.0).unwrap();
        }
        // No writer connected
        assert_eq!(query_all(&mut channel, 2, 1).unwrap()[0], 1.0);
        assert_eq!(query_all(&mut channel, 2, 1).unwrap()[0], 1.0);

        let mut second = client(root.path(), 1);
        second.set_attenuation_all(2.0).unwrap();
        assert_eq!(query_all(&mut channel, 2, 0).unwrap()[1], 2.0);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_teardown_removes_pipe_and_rejects_queries() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 2);
        let path = channel.pipe_path();
        assert!(path.exists());

        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!path.exists());
        assert!(matches!(
            query_all(&mut channel, 2, 0),
            Err(ChannelError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_client_cannot_connect_after_teardown() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = controller(root.path(), 2);
        channel.teardown();

        let result = AttenuationClient::open(root.path(), SIM_ID, 0, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_pipe_name() {
        let root = tempfile::tempdir().unwrap();
        let config = helpers::config(root.path()).with_pipe_name("custom.pipe");
        let mut channel = ChannelController::open(config, 2).unwrap();

        let mut client = AttenuationClient::open(root.path(), SIM_ID, 0, Some("custom.pipe"))
            .unwrap();
        client.set_attenuation_all(-20.0).unwrap();

        assert_eq!(query_all(&mut channel, 2, 1).unwrap()[0], -20.0);
    }
}

// ============================================================================
// Background Reader
// ============================================================================

mod background_tests {
    use super::*;

    fn start(root: &std::path::Path, n: usize) -> BackgroundChannel {
        BackgroundChannel::start(helpers::config(root), n).unwrap()
    }

    #[test]
    fn test_set_all_reaches_queries() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = start(root.path(), 4);
        let mut client = client(root.path(), 2);

        client.set_attenuation_all(100.0).unwrap();

        assert!(wait_for(|| query_all(&mut channel, 4, 2).unwrap() == vec![100.0; 4]));
    }

    #[test]
    fn test_pairwise_and_reset() {
        let root = tempfile::tempdir().unwrap();
        let channel = start(root.path(), 4);
        let mut client = client(root.path(), 1);

        client.set_attenuation_one(3, 5.0, 9.0).unwrap();
        assert!(wait_for(|| channel.matrix().lookup_pair(1, 3) == (9.0, 9.0)));

        client.reset().unwrap();
        assert!(wait_for(|| channel.matrix().lookup_pair(1, 3) == (60.0, 60.0)));
    }

    #[test]
    fn test_misframed_stream_surfaces_on_query() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = start(root.path(), 4);
        let mut client = client(root.path(), 0);

        let header = Header {
            command: CommandKind::Reset.code(),
            payload_size: 2,
        };
        client.send_raw(&header.to_bytes()).unwrap();

        let mut last = Ok(vec![]);
        assert!(wait_for(|| {
            last = query_all(&mut channel, 4, 0);
            last.is_err()
        }));
        assert!(matches!(
            last,
            Err(ChannelError::Protocol(ProtocolError::PayloadSizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_shutdown_with_connected_client() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = start(root.path(), 2);
        let _client = client(root.path(), 0);
        let path = channel.pipe_path().to_path_buf();

        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_shuts_down() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let channel = start(root.path(), 2);
            channel.pipe_path().to_path_buf()
        };
        assert!(!path.exists());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn last_broadcast_wins(
            n in 2usize..6,
            updates in prop::collection::vec((0u16..6, -100.0f64..100.0), 1..10)
        ) {
            let root = tempfile::tempdir().unwrap();
            let mut channel = controller(root.path(), n);
            let mut writer = client(root.path(), 0);

            let mut expected = vec![vec![60.0; n]; n];
            for (device, att) in updates.iter().copied().filter(|(d, _)| (*d as usize) < n) {
                writer
                    .send(&att_protocol::Command::SetAttenuationAll { device, attenuation: att })
                    .unwrap();
                let d = device as usize;
                for peer in 0..n {
                    expected[d][peer] = att;
                    expected[peer][d] = att;
                }
            }

            for rx in 0..n {
                let row = query_all(&mut channel, n, rx).unwrap();
                for tx in 0..n {
                    prop_assert_eq!(row[tx], expected[tx][rx]);
                }
            }
        }
    }
}
