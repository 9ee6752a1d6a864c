//! Property-based tests for the aerodynamic force cache using proptest.
//!
//! These tests check that the interpolated forces behave like a function of
//! the query (not of the fill order) and stay close to the exact model.

use bevy::math::{DVec2, DVec3};
use proptest::prelude::*;

use super::{AeroForceCache, CacheSettings, CacheSource, ForceSampler, StockDrag};
use crate::test_utils::fixtures;

fn stock_sampler() -> ForceSampler {
    let body = fixtures::kerbin();
    let raw = StockDrag {
        drag_area: 2.5,
        lift_area: 0.8,
        forward: DVec3::Y,
        atmosphere: body.atmosphere.clone(),
    };
    ForceSampler::new(Box::new(raw), body, DVec3::Y, DVec3::Z)
}

fn fresh_cache(sampler: &ForceSampler) -> AeroForceCache {
    AeroForceCache::new(&CacheSettings::default(), sampler.body.atmosphere_depth()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The same query returns the same force regardless of what was filled before.
    #[test]
    fn prop_cache_is_deterministic(
        v in 0.0f64..3000.0,
        aoa in -3.0f64..3.0,
        altitude in 0.0f64..70_000.0,
        warmup in prop::collection::vec((0.0f64..3000.0, -3.0f64..3.0, 0.0f64..70_000.0), 0..20),
    ) {
        let sampler = stock_sampler();
        let mut cold = fresh_cache(&sampler);
        let mut warm = fresh_cache(&sampler);
        for (wv, wa, wm) in warmup {
            warm.get_force(wv, wa, wm, &sampler);
        }

        let a = cold.get_force(v, aoa, altitude, &sampler);
        let b = warm.get_force(v, aoa, altitude, &sampler);
        prop_assert_eq!(a, b);
    }

    /// Packed forces are continuous, so nearby queries give nearby results.
    #[test]
    fn prop_cache_is_continuous(
        v in 10.0f64..2900.0,
        aoa in -3.0f64..3.0,
        altitude in 0.0f64..60_000.0,
    ) {
        let sampler = stock_sampler();
        let mut cache = fresh_cache(&sampler);
        let a = cache.get_force(v, aoa, altitude, &sampler);
        let b = cache.get_force(v + 1e-6, aoa + 1e-9, altitude + 1e-6, &sampler);
        let scale = a.length().max(1.0);
        prop_assert!((a - b).length() / scale < 1e-5, "jump from {} to {}", a, b);
    }

    /// Pack then unpack returns the original force wherever there is air.
    #[test]
    fn prop_pack_unpack_round_trip(
        fx in -1e6f64..1e6,
        fy in -1e6f64..1e6,
        v in 0.0f64..3000.0,
        altitude in 0.0f64..60_000.0,
    ) {
        let sampler = stock_sampler();
        let force = DVec2::new(fx, fy);
        let back = sampler.unpack(sampler.pack(force, v, altitude), v, altitude);
        prop_assert!((back - force).length() <= 1e-9 * force.length().max(1.0));
    }

    /// Queries beyond the table edges equal queries on the edges.
    #[test]
    fn prop_out_of_range_clamps(
        excess_v in 0.0f64..1e5,
        excess_aoa in 0.0f64..10.0,
        excess_alt in 0.0f64..1e6,
    ) {
        let sampler = stock_sampler();
        let mut cache = fresh_cache(&sampler);
        let depth = sampler.body.atmosphere_depth();
        let pi = std::f64::consts::PI;

        let beyond = cache.get_force(3000.0 + excess_v, pi + excess_aoa, depth + excess_alt, &sampler);
        let edge = cache.get_force(3000.0, pi, depth, &sampler);
        prop_assert_eq!(beyond, edge);

        let below = cache.get_force(-excess_v, -pi - excess_aoa, -excess_alt, &sampler);
        let low_edge = cache.get_force(0.0, -pi, 0.0, &sampler);
        prop_assert_eq!(below, low_edge);
    }

    /// Interpolated drag stays within a few percent of the exact drag.
    #[test]
    fn prop_cache_tracks_exact_drag(
        v in 200.0f64..2800.0,
        altitude in 0.0f64..50_000.0,
    ) {
        let sampler = stock_sampler();
        let mut cache = fresh_cache(&sampler);
        let cached = cache.get_force(v, 0.0, altitude, &sampler);
        let exact = sampler.exact_force(v, 0.0, altitude);
        prop_assert!(exact.x < 0.0);
        prop_assert!((cached.x - exact.x).abs() <= 0.02 * exact.x.abs());
    }
}
