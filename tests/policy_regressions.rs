use std::io::Write as _;

use sourcetrack::{
    AlphaVectorDocument, AlphaVectorPolicy, DecisionPolicy, EnvConfig, Infotaxis,
    InfotaxisLookahead, PolicyKind, SourceTracking,
};

fn env_with_seed(seed: u64) -> SourceTracking {
    SourceTracking::new(EnvConfig::default().with_shape(13, 9).with_seed(seed))
        .expect("environment should construct")
}

#[test]
fn one_step_lookahead_matches_infotaxis_along_an_episode() {
    let mut env = env_with_seed(41);
    let mut infotaxis = Infotaxis::new();
    let lookahead = InfotaxisLookahead::new(1, 0.0).expect("planner");

    for _ in 0..30 {
        if env.done() {
            break;
        }
        let reference = infotaxis.choose_action(&env).expect("infotaxis");
        let decision = lookahead.decide(&env).expect("lookahead");
        assert_eq!(decision.action, reference);
        env.step(reference, None, true).expect("step");
    }
}

#[test]
fn every_registered_policy_completes_a_forced_episode() {
    // Feed the same deterministic hit sequence to each policy; all of them
    // must keep producing legal actions on a live environment.
    for kind in [
        PolicyKind::Infotaxis,
        PolicyKind::SpaceAwareInfotaxis,
        PolicyKind::Greedy,
        PolicyKind::MeanDistance,
        PolicyKind::POverD,
        PolicyKind::RandomWalk,
        PolicyKind::Voting,
        PolicyKind::MostLikelyState,
    ] {
        let mut env = env_with_seed(5);
        let mut policy = kind.build(Some(9));
        for step in 0..40 {
            if env.done() {
                break;
            }
            let action = policy.choose_action(&env).expect("policy should decide");
            assert!(
                action < env.num_actions(),
                "{} returned an invalid action",
                kind.name()
            );
            let hit = if step % 7 == 0 { 1 } else { 0 };
            env.step(action, Some(hit), true).expect("step");
        }
    }
}

#[test]
fn deeper_lookahead_still_localizes() {
    let mut env = env_with_seed(47);
    let mut planner = InfotaxisLookahead::new(2, 1.0).expect("planner");
    let initial = env.entropy();
    for _ in 0..40 {
        if env.done() {
            break;
        }
        let action = planner.choose_action(&env).expect("planner should decide");
        env.step(action, None, true).expect("step");
    }
    assert!(
        env.done() || env.entropy() < initial,
        "two-step planning should localize or shed entropy"
    );
}

#[test]
fn alpha_policy_round_trips_through_json() -> anyhow::Result<()> {
    let env = env_with_seed(53);
    let (mw, mh) = (2 * 13 - 1, 2 * 9 - 1);

    // Two alphas: a flat one and one favoring mass away from the agent.
    let flat = vec![vec![1.0; mh]; mw];
    let mut peaked = vec![vec![0.0; mh]; mw];
    for (i, row) in peaked.iter_mut().enumerate() {
        for value in row.iter_mut() {
            *value = 3.0 * (i as f64) / (mw as f64);
        }
    }
    let document = AlphaVectorDocument {
        alphas: vec![flat, peaked],
        actions: vec![2, 1],
        discount: Some(0.98),
        shaping: Some("sqrt".to_string()),
        shaping_coef: Some(0.5),
    };

    let mut file = tempfile::NamedTempFile::new()?;
    serde_json::to_writer(&mut file, &document)?;
    file.flush()?;

    let mut policy = AlphaVectorPolicy::from_file(file.path())?;
    assert_eq!(policy.num_alphas(), 2);
    let action = policy.choose_action(&env)?;
    assert!([1, 2].contains(&action));

    // The same document evaluated in memory must agree with the file path.
    let mut direct = AlphaVectorPolicy::from_document(document)?;
    assert_eq!(direct.choose_action(&env)?, action);
    Ok(())
}

#[test]
fn lookahead_rejects_bad_parameters() {
    assert!(InfotaxisLookahead::new(0, 0.5).is_err());
    assert!(InfotaxisLookahead::new(3, 1.01).is_err());
}
