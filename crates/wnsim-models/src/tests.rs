use approx::assert_abs_diff_eq;
use rstest::rstest;

use crate::geometry::{Rectangle, Vector};
use crate::mobility::{
    ConstantVelocity, Mobility, MobilityConfig, MobilityModel, RandomDirection2d, RandomWalk2d, SpeedRange, WalkMode,
};
use crate::propagation::*;

const FREQ: f64 = 5e9;

#[test]
fn friis_loss() {
    let friis = FriisLoss::default();
    let expected = 20. * (4. * std::f64::consts::PI * 10. * FREQ / SPEED_OF_LIGHT).log10();
    assert_abs_diff_eq!(friis.loss(10., FREQ), expected, epsilon = 1e-9);
    assert_abs_diff_eq!(friis.loss(10., FREQ), 66.43, epsilon = 0.01);
    // doubling the distance adds 6 dB
    assert_abs_diff_eq!(friis.loss(20., FREQ) - friis.loss(10., FREQ), 6.0206, epsilon = 1e-4);
    assert_eq!(friis.loss(0., FREQ), 0.);
}

#[test]
fn friis_reception() {
    let friis = FriisLoss::default();
    let tx = Vector::new(0., 0., 0.);
    let rx = Vector::new(6., 8., 0.);
    assert_abs_diff_eq!(
        friis.compute_reception(&tx, &rx, 10., FREQ),
        10. - friis.loss(10., FREQ),
        epsilon = 1e-12
    );
}

#[rstest]
#[case(0.5, 46.6777)]
#[case(1., 46.6777)]
#[case(10., 76.6777)]
#[case(100., 106.6777)]
fn log_distance_loss(#[case] distance: f64, #[case] expected: f64) {
    let model = LogDistanceLoss::default();
    assert_abs_diff_eq!(model.loss(distance, FREQ), expected, epsilon = 1e-9);
}

#[test]
fn two_ray_ground_loss() {
    let model = TwoRayGroundLoss::new(1.5, 1.5);
    let friis = FriisLoss::default();
    let crossover = model.crossover_distance(FREQ);
    assert!(crossover > 400. && crossover < 500.);
    assert_abs_diff_eq!(model.loss(100., FREQ), friis.loss(100., FREQ), epsilon = 1e-12);
    assert_abs_diff_eq!(model.loss(1000., FREQ), 120. - 20. * 2.25f64.log10(), epsilon = 1e-9);
}

#[test]
fn propagation_delay() {
    assert_abs_diff_eq!(ConstantSpeedDelay::default().delay(300.), 300. / SPEED_OF_LIGHT, epsilon = 1e-18);
    assert_eq!(ZeroDelay::default().delay(300.), 0.);
}

#[test]
fn loss_config_from_yaml() {
    let config: PropagationLossConfig =
        serde_yaml::from_str("model: LogDistance\nexponent: 2.0\nreference_distance: 1.0\nreference_loss: 40.0\n")
            .unwrap();
    assert_abs_diff_eq!(config.build().loss(10., FREQ), 60., epsilon = 1e-9);
    let config: PropagationLossConfig = serde_yaml::from_str("model: Friis\n").unwrap();
    assert_eq!(config, PropagationLossConfig::default());
}

#[test]
fn constant_velocity() {
    let mut mobility = Mobility::new(Box::new(ConstantVelocity::new(
        Vector::new(1., 2., 0.),
        Vector::new(0.5, -1., 0.),
    )));
    assert_eq!(mobility.position_at(2.), Vector::new(2., 0., 0.));
    assert_eq!(mobility.position_at(4.), Vector::new(3., -2., 0.));
    // time does not go backwards
    assert_eq!(mobility.position_at(1.), Vector::new(3., -2., 0.));
    assert_eq!(mobility.time(), 4.);
}

#[test]
fn random_walk_stays_in_bounds() {
    let bounds = Rectangle::new(0., 5., 0., 25.);
    let mut model = RandomWalk2d::new(
        Vector::new(2., 2., 0.),
        bounds,
        SpeedRange::constant(1.),
        WalkMode::Time(2.),
        42,
    );
    for _ in 0..1000 {
        model.advance(0.37);
        assert!(bounds.contains(&model.position()));
        assert_abs_diff_eq!(model.velocity().length(), 1., epsilon = 1e-9);
    }
}

#[test]
fn random_walk_reflects_at_border() {
    let bounds = Rectangle::new(0., 10., 0., 10.);
    let mut model = RandomWalk2d::new(
        Vector::new(5., 5., 0.),
        bounds,
        SpeedRange::constant(7.),
        WalkMode::Distance(1000.),
        7,
    );
    let before = model.velocity();
    model.advance(10.);
    let after = model.velocity();
    assert!(bounds.contains(&model.position()));
    // reflections only flip the signs of the components
    assert_abs_diff_eq!(before.x.abs(), after.x.abs(), epsilon = 1e-9);
    assert_abs_diff_eq!(before.y.abs(), after.y.abs(), epsilon = 1e-9);
}

#[test]
fn random_walk_with_degenerate_bounds() {
    let bounds = Rectangle::new(3., 3., 0., 10.);
    let mut model = RandomWalk2d::new(
        Vector::new(100., 5., 0.),
        bounds,
        SpeedRange { min: 1., max: 3. },
        WalkMode::Time(1.),
        1,
    );
    for _ in 0..100 {
        model.advance(0.5);
        assert_eq!(model.position().x, 3.);
        assert!(bounds.contains(&model.position()));
    }
}

#[test]
fn random_walk_is_deterministic() {
    let config = MobilityConfig::RandomWalk {
        bounds: Rectangle::new(-50., 50., -50., 50.),
        speed: SpeedRange { min: 2., max: 4. },
        mode: WalkMode::Time(1.),
    };
    let mut a = Mobility::new(config.build(Vector::zero(), 5));
    let mut b = Mobility::new(config.build(Vector::zero(), 5));
    let mut c = Mobility::new(config.build(Vector::zero(), 6));
    let mut differs = false;
    for i in 1..=100 {
        let t = i as f64 * 0.3;
        let (pa, pb, pc) = (a.position_at(t), b.position_at(t), c.position_at(t));
        assert_eq!(pa, pb);
        differs |= pa != pc;
    }
    assert!(differs);
}

#[test]
fn random_direction_pauses_at_border() {
    let bounds = Rectangle::new(0., 50., 0., 50.);
    let mut model = RandomDirection2d::new(Vector::new(25., 25., 0.), bounds, SpeedRange::constant(20.), 0.2, 3);
    let mut elapsed = 0.;
    while !model.is_paused() {
        model.advance(0.01);
        elapsed += 0.01;
        assert!(bounds.contains(&model.position()));
        assert!(elapsed < 10., "node never reached the border");
    }
    let p = model.position();
    let on_border = p.x <= 1e-6 || p.x >= 50. - 1e-6 || p.y <= 1e-6 || p.y >= 50. - 1e-6;
    assert!(on_border);
    assert_eq!(model.velocity(), Vector::zero());

    // after the pause the node moves inside again
    let mut waited = 0.;
    while model.is_paused() {
        model.advance(0.01);
        waited += 0.01;
        assert!(waited < 0.5, "node never resumed moving");
    }
    assert!(bounds.contains(&model.position()));
    assert_abs_diff_eq!(model.velocity().length(), 20., epsilon = 1e-9);
}

#[test]
fn random_direction_long_run() {
    let bounds = Rectangle::new(0., 50., 0., 50.);
    let mut model = RandomDirection2d::new(Vector::new(0., 0., 0.), bounds, SpeedRange { min: 5., max: 20. }, 0.2, 9);
    for _ in 0..2000 {
        model.advance(0.05);
        assert!(bounds.contains(&model.position()));
    }
}

#[test]
fn mobility_config_from_yaml() {
    let yaml = "
model: RandomDirection
bounds: {x_min: 0, x_max: 50, y_min: 0, y_max: 50}
speed: {min: 20, max: 20}
pause: 0.2
";
    let config: MobilityConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(!config.is_static());
    let mut mobility = Mobility::new(config.build(Vector::new(10., 10., 0.), 1));
    assert!(Rectangle::new(0., 50., 0., 50.).contains(&mobility.position_at(3.)));
}
