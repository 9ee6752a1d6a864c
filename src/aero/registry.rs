//! Selection of the aerodynamic formula for a vessel.
//!
//! Providers are registered explicitly at startup and queried in order; the
//! configured preference wins when it is available, otherwise the first
//! available provider is used. The built-in stock provider is always last.

use bevy::math::DVec3;
use bevy::prelude::Resource;

use super::{AeroError, RawForceModel};
use crate::types::{Atmosphere, BodyParams, VesselSnapshot};

/// Which provider produced a model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Stock,
    External(String),
}

/// Factory of raw force models.
pub trait AeroProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Whether this provider can handle the vessel (e.g. a mod is installed).
    fn is_available(&self, _snapshot: &VesselSnapshot) -> bool {
        true
    }

    /// Build a force model for the vessel in its current configuration.
    fn build(&self, snapshot: &VesselSnapshot, body: &BodyParams) -> Box<dyn RawForceModel>;
}

/// Ordered list of providers.
#[derive(Resource)]
pub struct AeroRegistry {
    providers: Vec<Box<dyn AeroProvider>>,
}

impl Default for AeroRegistry {
    fn default() -> Self {
        Self {
            providers: vec![Box::new(StockProvider)],
        }
    }
}

impl AeroRegistry {
    /// A registry without even the stock provider.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Add a provider ahead of the stock one, after earlier registrations.
    pub fn register(&mut self, provider: impl AeroProvider + 'static) {
        let index = self
            .providers
            .iter()
            .position(|p| p.kind() == ProviderKind::Stock)
            .unwrap_or(self.providers.len());
        self.providers.insert(index, Box::new(provider));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Pick the provider for `snapshot`.
    pub fn select(
        &self,
        snapshot: &VesselSnapshot,
        preferred: Option<&ProviderKind>,
    ) -> Result<&dyn AeroProvider, AeroError> {
        if let Some(kind) = preferred
            && let Some(provider) = self
                .providers
                .iter()
                .find(|p| &p.kind() == kind && p.is_available(snapshot))
        {
            return Ok(provider.as_ref());
        }
        self.providers
            .iter()
            .find(|p| p.is_available(snapshot))
            .map(|p| p.as_ref())
            .ok_or(AeroError::NoProvider)
    }
}

/// Flat-plate drag and lift summed over the exposed parts.
#[derive(Clone, Debug)]
pub struct StockDrag {
    /// Total drag area of unshielded parts (m²).
    pub drag_area: f64,
    /// Total lift area of unshielded parts (m²).
    pub lift_area: f64,
    /// Vessel nose direction at build time.
    pub forward: DVec3,
    pub atmosphere: Option<Atmosphere>,
}

impl RawForceModel for StockDrag {
    fn compute_forces(&self, air_velocity: DVec3, altitude: f64) -> DVec3 {
        let rho = self.atmosphere.as_ref().map_or(0.0, |a| a.density(altitude));
        let speed = air_velocity.length();
        if rho <= 0.0 || speed <= 0.0 {
            return DVec3::ZERO;
        }
        let dir = air_velocity / speed;
        let q = 0.5 * rho * speed * speed;

        let cos_a = self.forward.dot(dir).clamp(-1.0, 1.0);
        let normal = self.forward - dir * cos_a;
        let sin_a = normal.length();

        let drag = -dir * q * (self.drag_area + self.lift_area * sin_a * sin_a);
        let lift = normal.normalize_or_zero() * q * self.lift_area * 2.0 * sin_a * cos_a;
        drag + lift
    }
}

/// Provider of [`StockDrag`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StockProvider;

impl AeroProvider for StockProvider {
    fn name(&self) -> &str {
        "stock"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Stock
    }

    fn build(&self, snapshot: &VesselSnapshot, body: &BodyParams) -> Box<dyn RawForceModel> {
        let exposed = snapshot.parts.iter().filter(|p| !p.shielded);
        let (drag_area, lift_area) = exposed.fold((0.0, 0.0), |(d, l), p| {
            (d + p.drag_area, l + p.lift_area)
        });
        Box::new(StockDrag {
            drag_area,
            lift_area,
            forward: snapshot.attitude.forward.normalize_or_zero(),
            atmosphere: body.atmosphere.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use approx::assert_relative_eq;

    struct Named {
        name: &'static str,
        available: bool,
    }

    impl AeroProvider for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::External(self.name.to_string())
        }

        fn is_available(&self, _snapshot: &VesselSnapshot) -> bool {
            self.available
        }

        fn build(&self, snapshot: &VesselSnapshot, body: &BodyParams) -> Box<dyn RawForceModel> {
            StockProvider.build(snapshot, body)
        }
    }

    #[test]
    fn test_default_registry_selects_stock() {
        let registry = AeroRegistry::default();
        let snapshot = fixtures::orbiting_snapshot(80_000.0);
        let provider = registry.select(&snapshot, None).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Stock);
    }

    #[test]
    fn test_registration_order_and_preference() {
        let mut registry = AeroRegistry::default();
        registry.register(Named {
            name: "far",
            available: false,
        });
        registry.register(Named {
            name: "ferram",
            available: true,
        });
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["far", "ferram", "stock"]
        );

        let snapshot = fixtures::orbiting_snapshot(80_000.0);
        // First available wins
        assert_eq!(registry.select(&snapshot, None).unwrap().name(), "ferram");
        // Preference wins when available
        let stock = registry
            .select(&snapshot, Some(&ProviderKind::Stock))
            .unwrap();
        assert_eq!(stock.name(), "stock");
        // Unavailable preference falls back
        let far = ProviderKind::External("far".into());
        assert_eq!(registry.select(&snapshot, Some(&far)).unwrap().name(), "ferram");
    }

    #[test]
    fn test_empty_registry_has_no_provider() {
        let snapshot = fixtures::orbiting_snapshot(80_000.0);
        assert!(matches!(
            AeroRegistry::empty().select(&snapshot, None),
            Err(AeroError::NoProvider)
        ));
    }

    #[test]
    fn test_stock_drag_opposes_motion() {
        let body = fixtures::kerbin();
        let drag = StockDrag {
            drag_area: 2.0,
            lift_area: 0.0,
            forward: DVec3::X,
            atmosphere: body.atmosphere.clone(),
        };
        let f = drag.compute_forces(DVec3::X * 100.0, 0.0);
        assert_relative_eq!(f.x, -0.5 * 1.225 * 100.0 * 100.0 * 2.0, max_relative = 1e-12);
        assert_eq!(drag.compute_forces(DVec3::X * 100.0, 80_000.0), DVec3::ZERO);
    }

    #[test]
    fn test_stock_lift_follows_nose() {
        let body = fixtures::kerbin();
        let model = StockDrag {
            drag_area: 1.0,
            lift_area: 1.0,
            forward: DVec3::new(1.0, 0.2, 0.0).normalize(),
            atmosphere: body.atmosphere.clone(),
        };
        // Nose above the flight path: lift points up (+Y)
        let f = model.compute_forces(DVec3::X * 200.0, 1_000.0);
        assert!(f.y > 0.0);
        assert!(f.x < 0.0);
    }

    #[test]
    fn test_shielded_parts_are_ignored() {
        let mut snapshot = fixtures::orbiting_snapshot(80_000.0);
        let body = fixtures::kerbin();
        let all = StockProvider
            .build(&snapshot, &body)
            .compute_forces(DVec3::Y * 100.0, 0.0);
        for part in &mut snapshot.parts {
            part.shielded = true;
        }
        let none = StockProvider
            .build(&snapshot, &body)
            .compute_forces(DVec3::Y * 100.0, 0.0);
        assert!(all.length() > 0.0);
        assert_eq!(none, DVec3::ZERO);
    }
}
