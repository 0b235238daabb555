//! End-to-end tests driving hosts through the public API the way a host
//! framework would: connect, push phases, write properties, destroy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use filament_core::{
    connect, get_property, inject, no_teardown, on_cleanup, pending_detections, prop, prop_map,
    schedule, set_prop, set_property, teardown, use_effect, use_hook, ConnectOptions,
    DetectionStrategy, EffectOptions, InjectFlags, Phase, ReactorError, StateTable,
    StaticInjector, Token, Value,
};

fn plain_host(
    props: StateTable,
    setup: impl FnOnce() -> Result<(), filament_core::BoxError>,
) -> filament_core::HostId {
    connect(
        props,
        Arc::new(StaticInjector::new()),
        ConnectOptions::default(),
        setup,
    )
    .unwrap()
}

#[test]
fn effect_first_runs_on_first_change_check() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        use_effect(
            move || {
                prop("count")?;
                runs_in.fetch_add(1, Ordering::SeqCst);
                Ok(no_teardown())
            },
            EffectOptions::default(),
        )?;
        Ok(())
    });

    // Registration alone does not run the effect.
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    schedule(host, Phase::Init).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn effect_reruns_when_tracked_dependency_changes() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = plain_host(
        StateTable::new().with("count", 0_i64).with("label", "a"),
        move || {
            use_effect(
                move || {
                    prop("count")?;
                    runs_in.fetch_add(1, Ordering::SeqCst);
                    Ok(no_teardown())
                },
                EffectOptions::default(),
            )?;
            Ok(())
        },
    );

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A tracked dependency changed: one re-run.
    set_property(host, "count", 1_i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // An untracked property changed: the pass runs but the effect stays put.
    set_property(host, "label", "b").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Same value written back: identity comparison sees no change.
    set_property(host, "count", 1_i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn teardown_released_before_rerun_and_at_destroy() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log_in = log.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        let log_effect = log_in.clone();
        use_effect(
            move || {
                let count = prop("count")?.as_i64().unwrap_or(-1);
                log_effect.lock().unwrap().push(format!("run {count}"));
                let log_drop = log_effect.clone();
                Ok(teardown(move || {
                    log_drop.lock().unwrap().push(format!("drop {count}"));
                }))
            },
            EffectOptions::default(),
        )?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    set_property(host, "count", 1_i64).unwrap();
    schedule(host, Phase::Destroy).unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        ["run 0", "drop 0", "run 1", "drop 1"],
        "teardown of run N precedes run N+1; destroy releases the last one"
    );
}

#[test]
fn hooks_fire_in_registration_order() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let log_in = log.clone();

    let host = plain_host(StateTable::new(), move || {
        let a = log_in.clone();
        use_hook(Phase::Init, move || {
            a.lock().unwrap().push("first");
            Ok(())
        })?;
        let b = log_in.clone();
        use_hook(Phase::Init, move || {
            b.lock().unwrap().push("second");
            Ok(())
        })?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["first", "second"]);

    // Init is once-only.
    schedule(host, Phase::Init).unwrap();
    assert_eq!(log.lock().unwrap().len(), 2);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn derived_phases_fire_at_the_right_times() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let log_in = log.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        for (phase, label) in [
            (Phase::InputsChanged, "inputs-changed"),
            (Phase::ChangeCheck, "change-check"),
            (Phase::ViewReady, "view-ready"),
            (Phase::ViewChecked, "view-checked"),
            (Phase::Rendered, "rendered"),
        ] {
            let log = log_in.clone();
            use_hook(phase, move || {
                log.lock().unwrap().push(label);
                Ok(())
            })?;
        }
        use_effect(
            || {
                prop("count")?;
                Ok(no_teardown())
            },
            EffectOptions::default(),
        )?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();

    // First run is not a change: no InputsChanged, no render dirt.
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["change-check"]);

    // First ViewChecked delivers ViewReady; nothing rendered yet.
    schedule(host, Phase::ViewChecked).unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["change-check", "view-ready", "view-checked"]
    );

    // A detected change emits InputsChanged before ChangeCheck and arms
    // Rendered for the next ViewChecked.
    set_property(host, "count", 1_i64).unwrap();
    schedule(host, Phase::ViewChecked).unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        [
            "change-check",
            "view-ready",
            "view-checked",
            "inputs-changed",
            "change-check",
            "view-checked",
            "rendered",
        ]
    );

    // No change since: ViewChecked alone, no Rendered, no second ViewReady.
    schedule(host, Phase::ViewChecked).unwrap();
    assert_eq!(log.lock().unwrap().len(), 8);
    assert_eq!(*log.lock().unwrap().last().unwrap(), "view-checked");

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn hooks_see_their_phase_in_the_ambient_context() {
    let checked = Arc::new(AtomicUsize::new(0));
    let checked_in = checked.clone();

    let host = plain_host(StateTable::new(), move || {
        // Setup itself runs with a host but no phase.
        assert!(filament_core::current_phase().is_none());
        let checked = checked_in.clone();
        use_hook(Phase::Init, move || {
            assert_eq!(filament_core::current_phase(), Some(Phase::Init));
            filament_core::current_host()?;
            checked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    assert_eq!(checked.load(Ordering::SeqCst), 1);

    // The pointer is cleared between callbacks.
    assert!(matches!(
        filament_core::current_host(),
        Err(ReactorError::NoActiveContext)
    ));

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn writes_during_dispatch_defer_to_one_followup_pass() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        use_hook(Phase::Init, || {
            // Lands mid-dispatch; must not recurse into a nested pass.
            set_prop("count", 1_i64)?;
            Ok(())
        })?;
        use_effect(
            move || {
                let count = prop("count")?.as_i64().unwrap_or(-1);
                assert_eq!(count, 1, "followup pass runs after the write");
                runs_in.fetch_add(1, Ordering::SeqCst);
                Ok(no_teardown())
            },
            EffectOptions::default(),
        )?;
        Ok(())
    });

    // The single Init trigger also runs the owed change-check pass.
    schedule(host, Phase::Init).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn schedule_strategy_queues_instead_of_running() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = connect(
        StateTable::new().with("count", 0_i64),
        Arc::new(StaticInjector::new()),
        ConnectOptions {
            strategy: DetectionStrategy::Schedule,
        },
        move || {
            use_effect(
                move || {
                    prop("count")?;
                    runs_in.fetch_add(1, Ordering::SeqCst);
                    Ok(no_teardown())
                },
                EffectOptions::default(),
            )?;
            Ok(())
        },
    )
    .unwrap();

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // The write only enqueues; the framework drains and schedules.
    set_property(host, "count", 1_i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let queued = pending_detections();
    assert_eq!(queued, vec![host]);
    for queued_host in queued {
        schedule(queued_host, Phase::ChangeCheck).unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(pending_detections().is_empty());

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn destroy_releases_everything_and_frees_the_handle() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let cleanups_in = cleanups.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        let setup_cleanup = cleanups_in.clone();
        on_cleanup(move || {
            setup_cleanup.fetch_add(1, Ordering::SeqCst);
        })?;
        let effect_cleanup = cleanups_in.clone();
        use_effect(
            move || {
                prop("count")?;
                let counter = effect_cleanup.clone();
                Ok(teardown(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
            },
            EffectOptions::default(),
        )?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    schedule(host, Phase::Destroy).unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    assert!(!filament_core::is_connected(host));

    // The handle is dead; later phases are rejected.
    assert!(matches!(
        schedule(host, Phase::ChangeCheck),
        Err(ReactorError::UnknownHost(_))
    ));
    assert!(matches!(
        get_property(host, "count"),
        Err(ReactorError::UnknownHost(_))
    ));
}

#[test]
fn hook_failure_flushes_buckets_but_keeps_the_host() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let cleanups_in = cleanups.clone();

    let host = plain_host(StateTable::new(), move || {
        let counter = cleanups_in.clone();
        on_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })?;
        use_hook(Phase::ChangeCheck, || Err("hook exploded".into()))?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();

    let err = schedule(host, Phase::ChangeCheck).unwrap_err();
    assert!(matches!(
        err,
        ReactorError::Hook {
            phase: Phase::ChangeCheck,
            ..
        }
    ));
    // Every bucket was flushed through the error channel.
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    // The host survives a non-destroy failure.
    assert!(filament_core::is_connected(host));

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn invalid_effect_return_is_rejected() {
    let host = plain_host(StateTable::new(), move || {
        use_effect(
            || Ok(Box::new(42_u8) as Box<dyn std::any::Any>),
            EffectOptions::default(),
        )?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    let err = schedule(host, Phase::ChangeCheck).unwrap_err();
    assert!(matches!(err, ReactorError::InvalidEffectReturn));

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn deep_mode_tracks_nested_keys() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = plain_host(
        StateTable::new().with(
            "config",
            Value::map_from([("theme".to_string(), Value::from("dark"))]),
        ),
        move || {
            use_effect(
                move || {
                    let config = prop_map("config")?;
                    // Repeated reads of the same property share a wrapper.
                    assert!(config.same_target(&prop_map("config")?));
                    config.get("theme");
                    runs_in.fetch_add(1, Ordering::SeqCst);
                    Ok(no_teardown())
                },
                EffectOptions::default(),
            )?;
            Ok(())
        },
    );

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Mutate the nested map in place from outside, then run a pass.
    let config = get_property(host, "config").unwrap();
    config
        .as_map()
        .unwrap()
        .write()
        .insert("theme".to_string(), Value::from("light"));
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // An untouched nested key is not a change.
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn untracked_effects_never_rerun() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in = runs.clone();

    let host = plain_host(StateTable::new().with("count", 0_i64), move || {
        use_effect(
            move || {
                prop("count")?;
                runs_in.fetch_add(1, Ordering::SeqCst);
                Ok(no_teardown())
            },
            EffectOptions::untracked(),
        )?;
        Ok(())
    });

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    set_property(host, "count", 5_i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn host_without_effects_runs_a_silent_lifecycle() {
    let host = plain_host(StateTable::new().with("count", 0_i64), || Ok(()));

    schedule(host, Phase::Init).unwrap();
    for _ in 0..3 {
        schedule(host, Phase::ChangeCheck).unwrap();
    }
    schedule(host, Phase::ViewChecked).unwrap();
    schedule(host, Phase::Destroy).unwrap();

    assert!(!filament_core::is_connected(host));
}

#[test]
fn teardown_survives_no_change_passes() {
    let drops = Arc::new(AtomicUsize::new(0));
    let drops_in = drops.clone();

    let host = plain_host(
        StateTable::new().with("count", 0_i64).with("label", "a"),
        move || {
            use_effect(
                move || {
                    prop("count")?;
                    let counter = drops_in.clone();
                    Ok(teardown(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }))
                },
                EffectOptions::default(),
            )?;
            Ok(())
        },
    );

    schedule(host, Phase::Init).unwrap();
    schedule(host, Phase::ChangeCheck).unwrap();

    // Passes without a tracked change leave the artifact live.
    schedule(host, Phase::ChangeCheck).unwrap();
    set_property(host, "label", "b").unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    schedule(host, Phase::Destroy).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reentrant_change_check_on_schedule_strategy_host_enqueues() {
    let host = connect(
        StateTable::new(),
        Arc::new(StaticInjector::new()),
        ConnectOptions {
            strategy: DetectionStrategy::Schedule,
        },
        || {
            use_hook(Phase::Init, || {
                let me = filament_core::current_host()?;
                // Lands mid-dispatch; must end up in the detection queue,
                // not be dropped.
                schedule(me, Phase::ChangeCheck)?;
                Ok(())
            })?;
            Ok(())
        },
    )
    .unwrap();

    schedule(host, Phase::Init).unwrap();
    assert_eq!(pending_detections(), vec![host]);

    schedule(host, Phase::Destroy).unwrap();
}

#[test]
fn inject_resolves_through_the_host_scope() {
    const GREETING: Token = Token::new("greeting");

    let injector = Arc::new(
        StaticInjector::new().provide(GREETING, Arc::new("hello".to_string())),
    );
    let resolved = Arc::new(Mutex::new(None));
    let resolved_in = resolved.clone();

    let host = connect(
        StateTable::new(),
        injector,
        ConnectOptions::default(),
        move || {
            let value = inject(&GREETING, InjectFlags::empty())?
                .and_then(|value| value.downcast_ref::<String>().cloned());
            *resolved_in.lock().unwrap() = value;
            Ok(())
        },
    )
    .unwrap();

    assert_eq!(resolved.lock().unwrap().as_deref(), Some("hello"));
    schedule(host, Phase::Destroy).unwrap();
}
