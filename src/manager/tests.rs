use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::bus::EventBus;
use crate::db::MemoryStore;
use crate::robot::{registry, BaseRobot, BaseRobotHandler, BaseRobotState};

fn test_manager() -> Arc<RobotManager> {
    Arc::new(RobotManager::new(
        Arc::new(EventBus::new(64)),
        MemoryStore::shared(),
        registry::builtin().unwrap(),
        CancellationToken::new(),
    ))
}

fn test_handler(device_id: &str, ip: &str) -> Arc<dyn RobotHandler> {
    let robot = Arc::new(BaseRobotState::new(BaseRobot::new(
        device_id,
        ip,
        RobotType::from("example_robot"),
    )));
    Arc::new(BaseRobotHandler::new(robot))
}

fn assert_indices_consistent(manager: &RobotManager) {
    let ids = manager.get_device_ids();
    let ips = manager.get_ips();
    assert_eq!(ids.len(), ips.len());
    for id in &ids {
        let robot = manager.get_robot(Some(id), None).unwrap();
        let ip = robot.snapshot().ip;
        // both identifiers must resolve to the same handler
        manager.get_handler(Some(id), Some(&ip)).unwrap();
    }
}

#[tokio::test]
async fn add_and_remove_keep_indices_consistent() {
    let manager = test_manager();
    for i in 0..5 {
        let (id, ip) = (format!("dev-{i}"), format!("10.0.0.{i}"));
        let admission = manager.add_robot(&id, &ip, test_handler(&id, &ip)).unwrap();
        assert_eq!(admission, Admission::Added);
        assert_indices_consistent(&manager);
    }

    manager.remove_robot(Some("dev-1"), None).unwrap();
    assert_indices_consistent(&manager);
    manager.remove_robot(None, Some("10.0.0.2")).unwrap();
    assert_indices_consistent(&manager);
    manager.remove_robot(Some("dev-3"), Some("10.0.0.3")).unwrap();
    assert_indices_consistent(&manager);
    assert_eq!(manager.get_device_ids().len(), 2);
}

#[tokio::test]
async fn duplicate_pair_is_rejected() {
    let manager = test_manager();
    manager
        .add_robot("dev-1", "10.0.0.7", test_handler("dev-1", "10.0.0.7"))
        .unwrap();
    let err = manager
        .add_robot("dev-1", "10.0.0.7", test_handler("dev-1", "10.0.0.7"))
        .unwrap_err();
    assert_eq!(err, HubError::RobotAlreadyExists);
}

#[tokio::test]
async fn same_device_new_ip_is_a_transfer() {
    let manager = test_manager();
    manager
        .add_robot("dev-1", "10.0.0.7", test_handler("dev-1", "10.0.0.7"))
        .unwrap();

    let admission = manager
        .add_robot("dev-1", "10.0.0.8", test_handler("dev-1", "10.0.0.8"))
        .unwrap();
    assert_eq!(admission, Admission::Transferred);

    // the robot record and both indices now agree on the new address
    let robot = manager.get_robot(Some("dev-1"), None).unwrap();
    assert_eq!(robot.snapshot().ip, "10.0.0.8");
    assert_eq!(
        manager.get_handler(None, Some("10.0.0.7")).unwrap_err(),
        HubError::RobotNotFound
    );
    manager.get_handler(Some("dev-1"), Some("10.0.0.8")).unwrap();
    assert_indices_consistent(&manager);
}

#[tokio::test]
async fn ip_conflict_with_other_device_evicts_prior() {
    let manager = test_manager();
    let first = test_handler("dev-1", "10.0.0.7");
    manager.add_robot("dev-1", "10.0.0.7", first.clone()).unwrap();

    let admission = manager
        .add_robot("dev-2", "10.0.0.7", test_handler("dev-2", "10.0.0.7"))
        .unwrap();
    assert_eq!(admission, Admission::Added);

    assert_eq!(
        manager.get_robot(Some("dev-1"), None).unwrap_err(),
        HubError::RobotNotFound
    );
    assert_eq!(
        manager.get_robot(Some("dev-2"), None).unwrap().snapshot().ip,
        "10.0.0.7"
    );
    // eviction closed the prior robot's disconnect channel
    assert!(first.disconnect_token().unwrap().is_cancelled());
    assert_indices_consistent(&manager);
}

#[tokio::test]
async fn concurrent_adds_for_one_device_leave_one_survivor() {
    let manager = test_manager();
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let ip = format!("10.1.0.{i}");
                manager.add_robot("dev-x", &ip, test_handler("dev-x", &ip))
            })
        })
        .collect();
    for t in tasks {
        let _ = t.await.unwrap();
    }

    assert_eq!(manager.get_device_ids(), vec!["dev-x".to_string()]);
    assert_eq!(manager.get_ips().len(), 1);
    assert_indices_consistent(&manager);
}

#[tokio::test]
async fn remove_with_mismatched_identifiers_fails() {
    let manager = test_manager();
    manager
        .add_robot("dev-1", "10.0.0.1", test_handler("dev-1", "10.0.0.1"))
        .unwrap();
    manager
        .add_robot("dev-2", "10.0.0.2", test_handler("dev-2", "10.0.0.2"))
        .unwrap();

    assert_eq!(
        manager.remove_robot(Some("dev-1"), Some("10.0.0.2")).unwrap_err(),
        HubError::RobotMismatch
    );
    assert_eq!(manager.remove_robot(None, None).unwrap_err(), HubError::InvalidInput);
    assert_eq!(
        manager.remove_robot(Some("ghost"), None).unwrap_err(),
        HubError::RobotNotFound
    );
    assert_eq!(manager.get_device_ids().len(), 2);
}

#[tokio::test]
async fn send_message_routes_by_either_identifier() {
    let manager = test_manager();
    manager
        .add_robot("dev-1", "10.0.0.1", test_handler("dev-1", "10.0.0.1"))
        .unwrap();

    manager
        .send_message(Some("dev-1"), None, Msg::new("ping", "test"))
        .unwrap();
    manager
        .send_message(None, Some("10.0.0.1"), Msg::new("ping", "test"))
        .unwrap();
    assert_eq!(
        manager
            .send_message(Some("ghost"), None, Msg::new("ping", "test"))
            .unwrap_err(),
        HubError::RobotNotFound
    );
}

#[tokio::test]
async fn admission_times_out_as_not_accepted() {
    let bus = Arc::new(EventBus::new(64));
    let manager = Arc::new(
        RobotManager::new(
            bus,
            MemoryStore::shared(),
            registry::builtin().unwrap(),
            CancellationToken::new(),
        )
        .with_registering_wait(Duration::from_millis(50)),
    );

    let err = manager
        .register_robot("dev-1", "10.0.0.7", &RobotType::from("example_robot"))
        .await
        .unwrap_err();
    assert_eq!(err, HubError::RobotNotAccepted);
    assert!(manager.get_registering_robots().is_empty());
    assert!(manager.get_robots().is_empty());
}

async fn decide_pending(manager: &Arc<RobotManager>, bus: &EventBus, accept: bool) {
    // wait for the pending admission to appear, then fire its decision event
    for _ in 0..100 {
        if let Some(reg) = manager.get_registering_robots().pop() {
            bus.publish(Event::new(reg.decision_event(), json!(accept))).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pending admission appeared");
}

#[tokio::test]
async fn accepted_admission_goes_live() {
    let bus = Arc::new(EventBus::new(64));
    let manager = Arc::new(RobotManager::new(
        Arc::clone(&bus),
        MemoryStore::shared(),
        registry::builtin().unwrap(),
        CancellationToken::new(),
    ));

    let register = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .register_robot("dev-1", "10.0.0.7", &RobotType::from("example_robot"))
                .await
        })
    };

    decide_pending(&manager, &bus, true).await;
    register.await.unwrap().unwrap();

    assert_eq!(manager.get_device_ids(), vec!["dev-1".to_string()]);
    assert!(manager.get_registering_robots().is_empty());
}

#[tokio::test]
async fn rejected_admission_leaves_no_trace() {
    let bus = Arc::new(EventBus::new(64));
    let manager = Arc::new(RobotManager::new(
        Arc::clone(&bus),
        MemoryStore::shared(),
        registry::builtin().unwrap(),
        CancellationToken::new(),
    ));

    let register = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .register_robot("dev-1", "10.0.0.7", &RobotType::from("example_robot"))
                .await
        })
    };

    decide_pending(&manager, &bus, false).await;
    assert_eq!(register.await.unwrap().unwrap_err(), HubError::RobotNotAccepted);
    assert!(manager.get_robots().is_empty());
    assert!(manager.get_registering_robots().is_empty());
}

#[tokio::test]
async fn unknown_type_is_rejected_before_any_event() {
    let manager = test_manager();
    let err = manager
        .register_robot("dev-1", "10.0.0.7", &RobotType::from("no_such_robot"))
        .await
        .unwrap_err();
    assert_eq!(err, HubError::NoRobotTypeConnHandler);
    assert!(manager.get_registering_robots().is_empty());
}

mod broken_robot {
    //! A deliberately miswired robot type: its handler exposes no
    //! disconnect token, which the manager must reject at registration.

    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::error::HubError;
    use crate::robot::registry::{TypeRegistry, TypeRegistryBuilder};
    use crate::robot::{
        BaseRobot, BaseRobotState, ConnHandler, Msg, Robot, RobotHandler, RobotType,
    };

    struct NoTokenHandler {
        robot: Arc<dyn Robot>,
    }

    impl RobotHandler for NoTokenHandler {
        fn robot(&self) -> Arc<dyn Robot> {
            Arc::clone(&self.robot)
        }

        fn send_msg(&self, _msg: Msg) -> Result<(), HubError> {
            Ok(())
        }

        fn disconnect_token(&self) -> Option<CancellationToken> {
            None
        }

        fn quick_action(&self) {}
    }

    struct NoTokenConn {
        handler: Arc<NoTokenHandler>,
    }

    #[async_trait]
    impl ConnHandler for NoTokenConn {
        async fn start(&self) -> Result<(), HubError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), HubError> {
            Ok(())
        }

        fn handler(&self) -> Arc<dyn RobotHandler> {
            Arc::clone(&self.handler) as Arc<dyn RobotHandler>
        }

        fn disconnect_token(&self) -> Option<CancellationToken> {
            None
        }
    }

    fn factory(device_id: &str, ip: &str) -> Result<Arc<dyn ConnHandler>, HubError> {
        let robot = Arc::new(BaseRobotState::new(BaseRobot::new(
            device_id,
            ip,
            RobotType::from("broken_robot"),
        )));
        Ok(Arc::new(NoTokenConn {
            handler: Arc::new(NoTokenHandler { robot }),
        }))
    }

    pub fn registry() -> TypeRegistry {
        let mut builder = TypeRegistryBuilder::new();
        builder.register("broken_robot", factory).unwrap();
        builder.build()
    }
}

#[tokio::test]
async fn handler_without_disconnect_token_is_rejected() {
    let bus = Arc::new(EventBus::new(64));
    let manager = Arc::new(RobotManager::new(
        Arc::clone(&bus),
        MemoryStore::shared(),
        broken_robot::registry(),
        CancellationToken::new(),
    ));

    let register = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .register_robot("dev-b", "10.0.0.9", &RobotType::from("broken_robot"))
                .await
        })
    };
    decide_pending(&manager, &bus, true).await;

    assert_eq!(
        register.await.unwrap().unwrap_err(),
        HubError::NoDisconnectChannel
    );
    // the half-registered robot was rolled back out of both indices
    assert!(manager.get_robots().is_empty());
}

#[tokio::test]
async fn main_cancellation_tears_down_live_robots() {
    let bus = Arc::new(EventBus::new(64));
    let main_token = CancellationToken::new();
    let manager = Arc::new(RobotManager::new(
        Arc::clone(&bus),
        MemoryStore::shared(),
        registry::builtin().unwrap(),
        main_token.clone(),
    ));

    let register = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .register_robot("dev-1", "10.0.0.7", &RobotType::from("example_robot"))
                .await
        })
    };
    decide_pending(&manager, &bus, true).await;
    register.await.unwrap().unwrap();

    main_token.cancel();
    for _ in 0..100 {
        if manager.get_robots().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("robots were not torn down after main cancellation");
}
