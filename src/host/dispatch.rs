//! Propagation dispatch.
//!
//! Requests are validated completely before any plugin code runs. Indexed and
//! multi-time requests use the plugin's own entry point when it has one and fall
//! back to repeated full propagation on population subsets otherwise.

use super::Host;
use crate::error::{OpiError, Result};
use crate::plugins::{OptionalCall, PluginState, Propagator};
use crate::population::{IndexList, Population};
use tracing::{debug, trace};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The shape of a propagation request.
#[derive(Debug)]
pub enum PropagationMode<'a> {
    /// Every object from the same epoch.
    Full,
    /// Only the listed objects, in list order.
    Indexed(&'a mut IndexList),
    /// One epoch per object; the slice length must equal the population size.
    MultiTime(&'a [f64]),
}

impl Host {
    /// Propagate `population` with the active propagator.
    ///
    /// `julian_day` is the start epoch and `dt` the step in seconds, negative for
    /// backward propagation. In multi-time mode the per-object epochs replace
    /// `julian_day`.
    pub fn propagate(
        &mut self,
        population: &mut Population,
        julian_day: f64,
        dt: f64,
        mode: PropagationMode<'_>,
    ) -> Result<()> {
        let result = match self.active.clone() {
            Some(name) => self.run_request(&name, population, julian_day, dt, mode),
            None => Err(OpiError::PropagatorNotActive(
                "no propagator selected".to_string(),
            )),
        };
        self.report(result)
    }

    /// Propagate with a specific enabled propagator instead of the active one.
    pub fn propagate_with(
        &mut self,
        name: &str,
        population: &mut Population,
        julian_day: f64,
        dt: f64,
        mode: PropagationMode<'_>,
    ) -> Result<()> {
        let result = self.run_request(name, population, julian_day, dt, mode);
        self.report(result)
    }

    fn run_request(
        &self,
        name: &str,
        population: &mut Population,
        julian_day: f64,
        dt: f64,
        mode: PropagationMode<'_>,
    ) -> Result<()> {
        let entry = self.registry.get(name)?;
        if entry.state() != PluginState::Enabled {
            return Err(OpiError::PropagatorNotActive(name.to_string()));
        }
        let propagator = entry.propagator();
        self.check_request(propagator, population, julian_day, dt)?;

        match mode {
            PropagationMode::Full => {
                trace!(
                    plugin = %name,
                    objects = population.len(),
                    julian_day,
                    dt,
                    "full propagation"
                );
                propagator.run(population, julian_day, dt)?;
                population.set_last_propagation_epoch(julian_day + dt / SECONDS_PER_DAY);
            }
            PropagationMode::Indexed(indices) => {
                population.check_owner(indices.host_id(), "index list")?;
                let checked = indices.resolve(population.len())?;
                if checked.is_empty() {
                    debug!(plugin = %name, "empty index list, nothing to propagate");
                    return Ok(());
                }
                propagate_indexed(propagator, population, indices, &checked, julian_day, dt)?;
            }
            PropagationMode::MultiTime(julian_days) => {
                if julian_days.len() != population.len() {
                    return Err(OpiError::InvalidArgument(format!(
                        "{} epochs given for {} objects",
                        julian_days.len(),
                        population.len()
                    )));
                }
                if let Some(day) = julian_days.iter().find(|&&day| !end_is_finite(day, dt)) {
                    return Err(OpiError::InvalidTime(format!("epoch {day} with step {dt}s")));
                }
                propagate_multi_time(propagator, population, julian_days, dt)?;
                let latest = julian_days.iter().copied().fold(f64::MIN, f64::max);
                population.set_last_propagation_epoch(latest + dt / SECONDS_PER_DAY);
            }
        }
        Ok(())
    }

    /// Checks shared by every mode. Nothing has been touched when these fail.
    fn check_request(
        &self,
        propagator: &Propagator,
        population: &Population,
        julian_day: f64,
        dt: f64,
    ) -> Result<()> {
        population.check_owner(self.id(), "population")?;
        if population.is_empty() {
            return Err(OpiError::InvalidArgument("population is empty".to_string()));
        }
        if !dt.is_finite() || !end_is_finite(julian_day, dt) {
            return Err(OpiError::InvalidTime(format!(
                "epoch {julian_day} with step {dt}s"
            )));
        }

        let capabilities = propagator.capabilities();
        if !self.accelerators.contains(capabilities.accelerators) {
            return Err(OpiError::CapabilityUnavailable {
                plugin: propagator.name().to_string(),
                required: capabilities.accelerators.describe(),
                available: self.accelerators.describe(),
            });
        }
        if let Some(required) = self.dispatch.required_frame {
            if capabilities.reference_frame != required {
                return Err(OpiError::UnsupportedFrame {
                    plugin: propagator.name().to_string(),
                    required: required.to_string(),
                    actual: capabilities.reference_frame.to_string(),
                });
            }
        }
        if dt < 0.0 && !(capabilities.backward_propagation && self.dispatch.allow_backward) {
            return Err(OpiError::UnsupportedDirection(format!(
                "{} cannot propagate backward (step {dt}s)",
                propagator.name()
            )));
        }
        Ok(())
    }
}

/// Indexed propagation. Without a native entry point each listed object is
/// propagated alone, in list order, so duplicates are advanced once per occurrence.
fn propagate_indexed(
    propagator: &Propagator,
    population: &mut Population,
    indices: &mut IndexList,
    checked: &[usize],
    julian_day: f64,
    dt: f64,
) -> Result<()> {
    if propagator.run_indexed(population, indices, julian_day, dt)? == OptionalCall::Completed {
        return Ok(());
    }
    debug!(plugin = %propagator.name(), objects = checked.len(), "indexed fallback");
    for &index in checked {
        let mut single = population.extract(&[index])?;
        propagator.run(&mut single, julian_day, dt)?;
        population.merge(&mut single, &[index])?;
    }
    Ok(())
}

/// Multi-time propagation. The fallback groups objects sharing an epoch and runs
/// one full propagation per group, earliest epoch first.
fn propagate_multi_time(
    propagator: &Propagator,
    population: &mut Population,
    julian_days: &[f64],
    dt: f64,
) -> Result<()> {
    if propagator.run_multi_time(population, julian_days, dt)? == OptionalCall::Completed {
        return Ok(());
    }
    let groups = group_by_epoch(julian_days);
    debug!(plugin = %propagator.name(), groups = groups.len(), "multi-time fallback");

    if let [(julian_day, _)] = groups.as_slice() {
        return propagator.run(population, *julian_day, dt);
    }
    for (julian_day, members) in &groups {
        let mut group = population.extract(members)?;
        propagator.run(&mut group, *julian_day, dt)?;
        population.merge(&mut group, members)?;
    }
    Ok(())
}

/// Whether both `julian_day` and the epoch `dt` seconds later are finite.
fn end_is_finite(julian_day: f64, dt: f64) -> bool {
    julian_day.is_finite() && (julian_day + dt / SECONDS_PER_DAY).is_finite()
}

/// Object indices grouped by identical epoch, in ascending epoch order.
pub(crate) fn group_by_epoch(julian_days: &[f64]) -> Vec<(f64, Vec<usize>)> {
    let mut order: Vec<usize> = (0..julian_days.len()).collect();
    order.sort_by(|&a, &b| julian_days[a].total_cmp(&julian_days[b]).then(a.cmp(&b)));

    let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
    for index in order {
        let day = julian_days[index];
        match groups.last_mut() {
            Some((current, members)) if *current == day => members.push(index),
            _ => groups.push((day, vec![index])),
        }
    }
    groups
}
