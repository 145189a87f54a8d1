use sourcetrack::{EPSILON, EnvConfig, SourceTracking, grid::Norm};

fn small_config(seed: u64) -> EnvConfig {
    EnvConfig::default().with_shape(13, 9).with_seed(seed)
}

#[test]
fn belief_stays_normalized_across_an_episode() {
    let mut env = SourceTracking::new(small_config(101)).expect("environment should construct");
    assert!((env.belief().sum() - 1.0).abs() < 1e-9);

    for step in 0..200 {
        if env.done() {
            break;
        }
        let action = step % env.num_actions();
        let outcome = env.step(action, None, true).expect("step should succeed");
        assert!(
            (env.belief().sum() - 1.0).abs() < 1e-9,
            "belief drifted at step {step}"
        );
        assert!((0.0..=1.0 + EPSILON).contains(&outcome.p_end));
        if outcome.done {
            assert!(env.done());
        }
    }
}

#[test]
fn same_seed_replays_the_same_episode() {
    let run = |seed: u64| {
        let mut env = SourceTracking::new(small_config(seed)).expect("environment");
        let mut hits = Vec::new();
        for step in 0..50 {
            if env.done() {
                break;
            }
            let outcome = env.step(step % env.num_actions(), None, true).expect("step");
            hits.push(outcome.hit);
        }
        (hits, env.agent(), env.entropy())
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn entropy_decreases_on_average_under_infotaxis() {
    use sourcetrack::{DecisionPolicy, Infotaxis};

    let mut env = SourceTracking::new(small_config(19)).expect("environment");
    let initial = env.entropy();
    let mut policy = Infotaxis::new();
    for _ in 0..60 {
        if env.done() {
            break;
        }
        let action = policy.choose_action(&env).expect("policy should decide");
        env.step(action, None, true).expect("step");
    }
    assert!(
        env.done() || env.entropy() < initial,
        "60 infotaxis steps should localize or shed entropy (H={})",
        env.entropy()
    );
}

#[test]
fn ground_truth_mode_terminates_at_the_source() {
    let config = small_config(3)
        .with_draw_source(true)
        .with_norm(Norm::Manhattan);
    let mut env = SourceTracking::new(config).expect("environment");
    let source = env.source().expect("ground-truth mode draws a source");

    // Walk straight to the drawn source; arrival must flag done.
    for _ in 0..100 {
        if env.done() {
            break;
        }
        let agent = env.agent();
        let action = if agent[0] < source[0] {
            1
        } else if agent[0] > source[0] {
            0
        } else if agent[1] < source[1] {
            3
        } else {
            2
        };
        env.step(action, None, true).expect("step");
    }
    assert!(env.done(), "agent walked onto the source without terminating");
    assert_eq!(env.agent(), source);
}

#[test]
fn forced_hits_bypass_sampling_and_update_the_hit_map() {
    let mut env = SourceTracking::new(small_config(23)).expect("environment");
    let outcome = env.step(1, Some(1), true).expect("forced step");
    assert_eq!(outcome.hit, Some(1));
    assert_eq!(env.hit_map()[env.agent()], Some(1));
    assert_eq!(env.cumulative_hits(), 1);

    let err = env.step(1, Some(env.nhits()), true);
    assert!(err.is_err(), "out-of-range forced hit must be rejected");
}

#[test]
fn blocked_moves_are_noops_but_still_observe() {
    let config = EnvConfig::default()
        .with_shape(7, 7)
        .with_start([0, 0])
        .with_seed(2);
    let mut env = SourceTracking::new(config).expect("environment");
    let before = env.entropy();
    let outcome = env.step(0, Some(0), true).expect("blocked step");
    assert_eq!(env.agent(), [0, 0], "blocked move must not displace the agent");
    assert!(outcome.hit.is_some());
    assert_ne!(env.entropy(), before, "the observation still updates the belief");
}
