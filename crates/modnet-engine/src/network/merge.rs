// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bulk id renumbering and network merging.
//!
//! Both operations end by telling every constraint about the id map so stored
//! ids and correspondence tables follow the elements.

use std::collections::BTreeMap;
use std::mem;
use tracing::debug;

use super::ModularNetwork;
use crate::types::{remap_id, ElementId, IdMap, NetworkError, NetworkResult};

impl ModularNetwork {
    /// Rewrite every stored id through `map`, keys and links alike
    fn apply_id_map(&mut self, map: &IdMap) {
        let neurons = mem::take(&mut self.neurons);
        self.neurons = neurons
            .into_values()
            .map(|mut n| {
                n.id = remap_id(map, n.id);
                n.incoming.iter_mut().for_each(|s| *s = remap_id(map, *s));
                n.outgoing.iter_mut().for_each(|s| *s = remap_id(map, *s));
                (n.id, n)
            })
            .collect();

        let synapses = mem::take(&mut self.synapses);
        self.synapses = synapses
            .into_values()
            .map(|mut s| {
                s.id = remap_id(map, s.id);
                s.source = remap_id(map, s.source);
                s.target = s.target.remapped(map);
                s.incoming.iter_mut().for_each(|x| *x = remap_id(map, *x));
                (s.id, s)
            })
            .collect();

        let groups = mem::take(&mut self.groups);
        self.groups = groups
            .into_values()
            .map(|mut g| {
                g.id = remap_id(map, g.id);
                g.parent = g.parent.map(|p| remap_id(map, p));
                g.neurons.iter_mut().for_each(|n| *n = remap_id(map, *n));
                g.sub_modules.iter_mut().for_each(|m| *m = remap_id(map, *m));
                for c in g.constraints.iter_mut() {
                    c.set_id(remap_id(map, c.id()));
                }
                (g.id, g)
            })
            .collect::<BTreeMap<_, _>>();

        self.default_group = remap_id(map, self.default_group);
        self.notify_member_ids_changed(map);
    }

    /// Give a module, everything nested in it and its enclosed synapses fresh ids
    ///
    /// Returns the old -> new map.
    pub fn renew_module_ids(&mut self, module: ElementId) -> NetworkResult<IdMap> {
        if self.module(module).is_none() {
            return Err(NetworkError::NotAModule(module));
        }
        let mut ids = vec![module];
        ids.extend(self.all_enclosed_modules(module));
        ids.extend(self.all_enclosed_neurons(module));
        ids.extend(self.all_enclosed_synapses(module));

        let mut map = IdMap::new();
        for old in ids {
            if !map.contains_key(&old) {
                let new = self.generate_next_id();
                map.insert(old, new);
            }
        }
        self.apply_id_map(&map);
        debug!(target: "modnet-engine", "Renewed {} ids of module {}", map.len(), module);
        Ok(map)
    }

    /// Move every element of `other` into this network under fresh ids
    ///
    /// Members of `other`'s default group join this default group, along
    /// with its nested modules and constraints. Returns the old -> new map.
    pub fn merge(&mut self, mut other: ModularNetwork) -> IdMap {
        let mut old_ids: Vec<ElementId> = other.neurons.keys().copied().collect();
        old_ids.extend(other.synapses.keys().copied());
        old_ids.extend(other.groups.keys().copied());
        old_ids.extend(other.all_constraints().map(|(_, c)| c.id()));

        let mut map = IdMap::new();
        for old in old_ids {
            let new = self.generate_next_id();
            map.insert(old, new);
        }
        other.apply_id_map(&map);

        let other_default = other.default_group;
        let mut groups = mem::take(&mut other.groups);
        let imported_default = groups.remove(&other_default);

        self.neurons.append(&mut other.neurons);
        self.synapses.append(&mut other.synapses);
        for (_, mut group) in groups {
            if group.parent == Some(other_default) {
                group.parent = Some(self.default_group);
            }
            self.groups.insert(group.id, group);
        }

        if let Some(imported) = imported_default {
            if let Some(default_group) = self.groups.get_mut(&self.default_group) {
                default_group.neurons.extend(imported.neurons);
                default_group.sub_modules.extend(imported.sub_modules);
                for mut c in imported.constraints {
                    c.set_group(Some(self.default_group));
                    default_group.constraints.push(c);
                }
            }
        }

        self.adjust_id_counter();
        debug!(target: "modnet-engine", "Merged {} elements", map.len());
        map
    }
}
