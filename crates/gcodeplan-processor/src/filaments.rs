//! Used-filament accounting
//!
//! Extruded volume is collected in caches while the active filament stays
//! the same and moved into the per-filament tables whenever a colour or
//! tool change closes the current segment.

use gcodeplan_core::ExtrusionRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length (m) and weight (g) extruded for one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleUsage {
    pub length_m: f32,
    pub weight_g: f32,
}

/// Filament consumption of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsedFilaments {
    color_change_cache: f32,
    pub volumes_per_color_change: Vec<f32>,

    model_cache: f32,
    pub model_volumes_per_filament: BTreeMap<usize, f32>,

    wipe_tower_cache: f32,
    pub wipe_tower_volumes_per_filament: BTreeMap<usize, f32>,

    support_cache: f32,
    pub support_volumes_per_filament: BTreeMap<usize, f32>,

    total_cache: f32,
    pub total_volumes_per_filament: BTreeMap<usize, f32>,

    role_cache: f32,
    pub filaments_per_role: BTreeMap<ExtrusionRole, RoleUsage>,
}

/// Which caches a change event closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilamentEvent {
    ColorChange,
    ToolChange,
}

/// Filament properties the role table needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilamentProperties {
    pub diameter: f32,
    pub density: f32,
}

impl UsedFilaments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increase_model(&mut self, volume: f32) {
        self.color_change_cache += volume;
        self.model_cache += volume;
        self.role_cache += volume;
        self.total_cache += volume;
    }

    pub fn increase_support(&mut self, volume: f32) {
        self.support_cache += volume;
        self.role_cache += volume;
        self.total_cache += volume;
    }

    pub fn increase_wipe_tower(&mut self, volume: f32) {
        self.wipe_tower_cache += volume;
        self.role_cache += volume;
        self.total_cache += volume;
    }

    fn close_color_change(&mut self) {
        if self.color_change_cache != 0.0 {
            self.volumes_per_color_change.push(self.color_change_cache);
            self.color_change_cache = 0.0;
        }
    }

    fn close_into(cache: &mut f32, table: &mut BTreeMap<usize, f32>, filament_id: usize) {
        if *cache != 0.0 {
            *table.entry(filament_id).or_default() += *cache;
            *cache = 0.0;
        }
    }

    /// Move the role cache into the entry of the role it was extruded with
    pub fn process_role_cache(&mut self, role: ExtrusionRole, filament: FilamentProperties) {
        if self.role_cache == 0.0 {
            return;
        }
        let area = std::f32::consts::PI * (0.5 * filament.diameter).powi(2);
        let length_m = if area > 0.0 {
            self.role_cache / area * 0.001
        } else {
            0.0
        };
        let usage = self.filaments_per_role.entry(role).or_default();
        usage.length_m += length_m;
        usage.weight_g += self.role_cache * filament.density * 0.001;
        self.role_cache = 0.0;
    }

    /// Close the caches affected by `event` for the outgoing filament
    pub fn process_event(&mut self, event: FilamentEvent, filament_id: usize) {
        match event {
            FilamentEvent::ColorChange => self.close_color_change(),
            FilamentEvent::ToolChange => {
                Self::close_into(&mut self.model_cache, &mut self.model_volumes_per_filament, filament_id);
                Self::close_into(&mut self.support_cache, &mut self.support_volumes_per_filament, filament_id);
                Self::close_into(&mut self.total_cache, &mut self.total_volumes_per_filament, filament_id);
            }
        }
    }

    /// Close every cache at the end of the file
    pub fn process_caches(&mut self, filament_id: usize, role: ExtrusionRole, filament: FilamentProperties) {
        self.close_color_change();
        Self::close_into(&mut self.model_cache, &mut self.model_volumes_per_filament, filament_id);
        self.process_role_cache(role, filament);
        self.process_wipe_tower_cache(filament_id);
        Self::close_into(&mut self.support_cache, &mut self.support_volumes_per_filament, filament_id);
        Self::close_into(&mut self.total_cache, &mut self.total_volumes_per_filament, filament_id);
    }

    /// Close the wipe tower cache, called when the tower region ends
    pub fn process_wipe_tower_cache(&mut self, filament_id: usize) {
        Self::close_into(
            &mut self.wipe_tower_cache,
            &mut self.wipe_tower_volumes_per_filament,
            filament_id,
        );
    }

    /// Total extruded volume of each filament (mm³), indexed by filament id
    pub fn total_volumes(&self, filament_count: usize) -> Vec<f32> {
        let len = self
            .total_volumes_per_filament
            .keys()
            .next_back()
            .map_or(0, |last| last + 1)
            .max(filament_count);
        let mut volumes = vec![0.0; len];
        for (id, volume) in &self.total_volumes_per_filament {
            volumes[*id] = *volume;
        }
        volumes
    }
}
