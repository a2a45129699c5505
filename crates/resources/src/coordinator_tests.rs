use super::*;
use crate::lock::ExclusiveLock;

#[test]
fn get_current_is_none_outside_a_transform() {
    let coordinator = LockCoordinator::new();
    assert!(coordinator.get_current().is_none());
    assert!(matches!(
        coordinator.assert_has_state_lock(),
        Err(CoordinationError::StateLockNotHeld)
    ));
}

#[test]
fn get_current_is_some_for_the_holder() {
    let coordinator = LockCoordinator::new();
    let inner = Arc::clone(&coordinator);

    coordinator.run(move || {
        assert!(inner.get_current().is_some());
        assert!(inner.assert_has_state_lock().is_ok());
    });

    assert!(coordinator.get_current().is_none());
}

#[test]
fn get_current_is_none_for_other_threads() {
    let coordinator = LockCoordinator::new();
    let inner = Arc::clone(&coordinator);

    coordinator.run(move || {
        let observer = {
            let coordinator = Arc::clone(&inner);
            thread::spawn(move || coordinator.get_current().is_none())
        };
        assert!(observer.join().unwrap());
    });
}

#[test]
fn run_returns_the_action_result() {
    let coordinator = LockCoordinator::new();
    assert_eq!(coordinator.run(|| 6 * 7), 42);
}

#[test]
fn with_state_lock_maps_dispositions_to_return_values() {
    let coordinator = LockCoordinator::new();

    let finished = coordinator
        .with_state_lock(|_| Ok::<_, CoordinationError>(Disposition::Finished))
        .unwrap();
    let failed = coordinator
        .with_state_lock(|_| Ok::<_, CoordinationError>(Disposition::Failed))
        .unwrap();

    assert!(finished);
    assert!(!failed);
}

#[test]
fn run_until_finished_returns_the_carried_value() {
    let coordinator = LockCoordinator::new();

    let result = coordinator
        .run_until_finished(|_| Ok::<_, CoordinationError>(OperationResult::Finished(42)));

    assert_eq!(result.unwrap(), 42);
}

#[test]
fn run_until_finished_supports_no_result_completion() {
    let coordinator = LockCoordinator::new();

    let result =
        coordinator.run_until_finished(|_| Ok::<_, CoordinationError>(OperationResult::Finished(())));

    assert!(result.is_ok());
}

#[test]
fn release_listener_fires_once_per_released_lock() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");

    let released = Arc::new(Mutex::new(Vec::new()));
    let listener: LockReleaseListener = {
        let released = Arc::clone(&released);
        Arc::new(move |lock: &dyn ResourceLock| {
            released
                .lock()
                .unwrap()
                .push(lock.display_name().to_string());
        })
    };
    coordinator.add_lock_release_listener(Arc::clone(&listener));

    coordinator.run(|| lock.try_lock()).unwrap();
    coordinator.run(|| lock.unlock()).unwrap();

    assert_eq!(*released.lock().unwrap(), vec!["project :a"]);
}

#[test]
fn removed_listener_no_longer_fires() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");

    let released = Arc::new(Mutex::new(Vec::new()));
    let listener: LockReleaseListener = {
        let released = Arc::clone(&released);
        Arc::new(move |lock: &dyn ResourceLock| {
            released
                .lock()
                .unwrap()
                .push(lock.display_name().to_string());
        })
    };
    coordinator.add_lock_release_listener(Arc::clone(&listener));
    coordinator.remove_lock_release_listener(&listener);

    coordinator.run(|| lock.try_lock()).unwrap();
    coordinator.run(|| lock.unlock()).unwrap();

    assert!(released.lock().unwrap().is_empty());
}

#[test]
fn listeners_fire_in_registration_order() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");

    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        coordinator.add_lock_release_listener(Arc::new(move |_: &dyn ResourceLock| {
            order.lock().unwrap().push(tag);
        }));
    }

    coordinator.run(|| lock.try_lock()).unwrap();
    coordinator.run(|| lock.unlock()).unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn rollback_releases_do_not_fire_listeners() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");

    let fired = Arc::new(Mutex::new(0));
    let listener: LockReleaseListener = {
        let fired = Arc::clone(&fired);
        Arc::new(move |_: &dyn ResourceLock| *fired.lock().unwrap() += 1)
    };
    coordinator.add_lock_release_listener(listener);

    coordinator
        .with_state_lock(|_| {
            assert!(lock.try_lock()?);
            Ok::<_, CoordinationError>(Disposition::Failed)
        })
        .unwrap();

    assert!(!lock.is_locked());
    assert_eq!(*fired.lock().unwrap(), 0);
}

#[test]
fn net_zero_acquire_then_release_fires_no_listener() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");

    let fired = Arc::new(Mutex::new(0));
    let listener: LockReleaseListener = {
        let fired = Arc::clone(&fired);
        Arc::new(move |_: &dyn ResourceLock| *fired.lock().unwrap() += 1)
    };
    coordinator.add_lock_release_listener(listener);

    coordinator
        .run(|| {
            assert!(lock.try_lock().unwrap());
            lock.unlock().unwrap();
        });

    assert!(!lock.is_locked());
    assert_eq!(*fired.lock().unwrap(), 0);
}

#[test]
fn release_before_a_failure_still_notifies_listeners() {
    let coordinator = LockCoordinator::new();
    let lock = ExclusiveLock::new(Arc::clone(&coordinator), "project :a");
    coordinator.run(|| lock.try_lock()).unwrap();

    let fired = Arc::new(Mutex::new(0));
    let listener: LockReleaseListener = {
        let fired = Arc::clone(&fired);
        Arc::new(move |_: &dyn ResourceLock| *fired.lock().unwrap() += 1)
    };
    coordinator.add_lock_release_listener(listener);

    coordinator
        .with_state_lock(|_| {
            lock.unlock()?;
            Ok::<_, CoordinationError>(Disposition::Failed)
        })
        .unwrap();

    assert!(!lock.is_locked());
    assert_eq!(*fired.lock().unwrap(), 1);
}
