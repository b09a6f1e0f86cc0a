// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dimension-ordered transpose.
//!
//! The terminal id is read as a mixed-radix tuple
//! `(c, d0, .., dk-1, i)` with the concentration component varying
//! fastest, then the dimension indices, then the interface-port index.
//! Enabled dimensions are paired in order and each pair's components
//! are swapped; everything else carries through.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{Fixed, PatternContext, TrafficPattern};
use crate::error::Error;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct DimTransposeSettings {
    dimensions: Vec<u32>,
    concentration: u32,
    interface_ports: u32,
    /// Absent means every dimension participates.
    #[serde(default)]
    enabled_dimensions: Option<Vec<bool>>,
}

/// Linear index of a mixed-radix tuple; `radix[0]` varies fastest.
fn linearize(tuple: &[u32], radix: &[u32]) -> u32 {
    let mut index = 0;
    for (d, c) in tuple.iter().enumerate() {
        index += c * radix[0..d].iter().product::<u32>();
    }
    index
}

/// Mixed-radix tuple of a linear index; inverse of [`linearize`].
fn delinearize(index: u32, radix: &[u32]) -> Vec<u32> {
    let mut remainder = index;
    let mut tuple = vec![0; radix.len()];
    for (d, m) in radix.iter().enumerate() {
        tuple[d] = remainder % m;
        remainder /= m;
    }
    tuple
}

pub(super) fn dim_transpose(
    context: &PatternContext,
    settings: &Value,
) -> Result<Box<dyn TrafficPattern>, Error> {
    let settings: DimTransposeSettings = crate::config::from_settings(settings)?;
    if settings.dimensions.is_empty() {
        return Err(Error::InvalidSetting(
            "dim_transpose requires at least one dimension".to_string(),
        ));
    }

    let mut radix = Vec::with_capacity(settings.dimensions.len() + 2);
    radix.push(settings.concentration);
    radix.extend_from_slice(&settings.dimensions);
    radix.push(settings.interface_ports);
    if radix.iter().any(|&w| w == 0) {
        return Err(Error::InvalidSetting(
            "dim_transpose widths must be nonzero".to_string(),
        ));
    }
    let product: u32 = radix.iter().product();
    if product != context.num_terminals {
        return Err(Error::InvalidSetting(format!(
            "dim_transpose shape covers {} terminals, network has {}",
            product, context.num_terminals
        )));
    }

    let enabled = match settings.enabled_dimensions {
        Some(enabled) => {
            if enabled.len() != settings.dimensions.len() {
                return Err(Error::InvalidSetting(format!(
                    "enabled_dimensions has {} entries for {} dimensions",
                    enabled.len(),
                    settings.dimensions.len()
                )));
            }
            enabled
        }
        None => vec![true; settings.dimensions.len()],
    };

    let mut tuple = delinearize(context.self_id, &radix);
    // Swap consecutive pairs of enabled dimensions; an unpaired trailing
    // dimension carries through.
    let enabled_dims: Vec<usize> = enabled
        .iter()
        .enumerate()
        .filter(|(_, &on)| on)
        .map(|(d, _)| d + 1)
        .collect();
    for pair in enabled_dims.chunks_exact(2) {
        tuple.swap(pair[0], pair[1]);
    }

    Ok(Fixed::boxed(linearize(&tuple, &radix), context.num_terminals))
}
