//! Core SugarScape engine: sugar field, agent registry, foraging and
//! replacement policies, and the deterministic step scheduler.
//!
//! Every stochastic choice is drawn from a single [`SmallRng`] seeded from
//! the configuration, in a fixed order: world setup draws one empty-cell
//! index and then wealth, metabolism, vision, and max-age per agent; each
//! step draws the visit-order shuffle, then one empty-cell index followed by
//! the same four attribute draws per replacement. Empty cells are always
//! enumerated row-major, so two worlds built from identical configurations
//! evolve identically.

use rand::{Rng, SeedableRng, rngs::SmallRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;
use std::fmt;
use sugarscape_grid::{Cell, Grid};
use thiserror::Error;
use tracing::warn;

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Errors surfaced by the simulation engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Indicates an invalid configuration value. Raised at construction only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// No empty cell was available when inserting a replacement agent.
    #[error("no empty cell available for replacement")]
    CapacityExhausted,
}

/// Inclusive integer range used when drawing agent attributes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeRange {
    pub min: u32,
    pub max: u32,
}

impl AttributeRange {
    /// Create an inclusive `[min, max]` range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    const fn is_valid(self) -> bool {
        self.min <= self.max
    }

    fn sample(self, rng: &mut SmallRng) -> u32 {
        rng.random_range(self.min..=self.max)
    }
}

/// Static configuration for a SugarScape world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SugarScapeConfig {
    /// Width of the world in cells.
    pub width: u32,
    /// Height of the world in cells.
    pub height: u32,
    /// High-capacity peak locations the capacity map decays away from.
    pub peaks: Vec<Cell>,
    /// Capacity at a peak; capacities fall off with distance from here.
    pub max_sugar: u32,
    /// Cells of distance per unit of capacity lost (integer division).
    pub decay_divisor: u32,
    /// Sugar regrown on every cell each step, clamped to capacity.
    pub growth_rate: u32,
    /// Number of live agents, held constant by replacement.
    pub population: usize,
    /// Range for the wealth endowment of a fresh agent.
    pub initial_wealth: AttributeRange,
    /// Range for per-step sugar consumption.
    pub metabolic_rate: AttributeRange,
    /// Range for foraging vision radius.
    pub vision: AttributeRange,
    /// Range for the age at which an agent dies of old age.
    pub max_age: AttributeRange,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for SugarScapeConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
            peaks: vec![Cell::new(15, 15), Cell::new(35, 35)],
            max_sugar: 4,
            decay_divisor: 8,
            growth_rate: 1,
            population: 250,
            initial_wealth: AttributeRange::new(5, 25),
            metabolic_rate: AttributeRange::new(1, 4),
            vision: AttributeRange::new(1, 6),
            max_age: AttributeRange::new(60, 100),
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl SugarScapeConfig {
    /// Validates the configuration, returning the derived grid geometry.
    fn validate(&self) -> Result<Grid, WorldError> {
        let grid = Grid::new(self.width, self.height)
            .map_err(|_| WorldError::InvalidConfig("world dimensions must be non-zero"))?;
        if self.peaks.is_empty() {
            return Err(WorldError::InvalidConfig("peak list must not be empty"));
        }
        if self.peaks.iter().any(|peak| !grid.contains(*peak)) {
            return Err(WorldError::InvalidConfig("peaks must lie within the grid"));
        }
        if self.decay_divisor == 0 {
            return Err(WorldError::InvalidConfig("decay_divisor must be positive"));
        }
        if !self.initial_wealth.is_valid()
            || !self.metabolic_rate.is_valid()
            || !self.vision.is_valid()
            || !self.max_age.is_valid()
        {
            return Err(WorldError::InvalidConfig(
                "attribute range lower bounds must not exceed upper bounds",
            ));
        }
        if self.metabolic_rate.min == 0 || self.vision.min == 0 || self.max_age.min == 0 {
            return Err(WorldError::InvalidConfig(
                "metabolism, vision, and max age must be positive",
            ));
        }
        if self.population == 0 {
            return Err(WorldError::InvalidConfig("population must be positive"));
        }
        if self.population > grid.cell_count() {
            return Err(WorldError::InvalidConfig(
                "population cannot exceed the number of cells",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be positive",
            ));
        }
        Ok(grid)
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

/// The renewable resource field: per-cell capacity and current level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SugarGrid {
    width: u32,
    height: u32,
    capacity: Vec<u32>,
    level: Vec<u32>,
}

impl SugarGrid {
    /// Build the capacity map from peaks and start every level at capacity.
    ///
    /// Each cell gets `max_sugar - distance_to_nearest_peak / decay_divisor`,
    /// clamped to zero, where the distance is rounded Euclidean.
    #[must_use]
    pub fn build(grid: &Grid, peaks: &[Cell], max_sugar: u32, decay_divisor: u32) -> Self {
        let mut capacity = Vec::with_capacity(grid.cell_count());
        for index in 0..grid.cell_count() {
            let distance = grid.distance_to_nearest(grid.cell_at(index), peaks);
            capacity.push(max_sugar.saturating_sub(distance / decay_divisor));
        }
        let level = capacity.clone();
        Self {
            width: grid.width(),
            height: grid.height(),
            capacity,
            level,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major capacity values.
    #[must_use]
    pub fn capacity(&self) -> &[u32] {
        &self.capacity
    }

    /// Row-major current levels.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.level
    }

    #[inline]
    const fn offset(&self, cell: Cell) -> usize {
        (cell.y as usize) * (self.width as usize) + (cell.x as usize)
    }

    /// Capacity at a specific in-bounds cell.
    #[must_use]
    pub fn capacity_at(&self, cell: Cell) -> u32 {
        self.capacity[self.offset(cell)]
    }

    /// Current level at a specific in-bounds cell.
    #[must_use]
    pub fn level_at(&self, cell: Cell) -> u32 {
        self.level[self.offset(cell)]
    }

    /// Regrow every cell by `growth_rate`, clamped to its capacity.
    pub fn grow(&mut self, growth_rate: u32) {
        for (level, cap) in self.level.iter_mut().zip(&self.capacity) {
            *level = level.saturating_add(growth_rate).min(*cap);
        }
    }

    /// Take all sugar at `cell`, leaving it fully depleted.
    pub fn harvest(&mut self, cell: Cell) -> u32 {
        let index = self.offset(cell);
        std::mem::take(&mut self.level[index])
    }

    /// Total sugar currently on the field.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.level.iter().map(|&value| u64::from(value)).sum()
    }
}

/// A live agent. Position is unique among live agents; vision, metabolism,
/// and max age are fixed for the agent's life.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub position: Cell,
    pub vision: u32,
    pub metabolic_rate: u32,
    pub age: u32,
    pub max_age: u32,
    /// Accumulated sugar; may go negative transiently before the death check.
    pub wealth: i64,
}

impl Agent {
    /// Draw a fresh agent at `position`. Attribute draws happen in the fixed
    /// order wealth, metabolism, vision, max age.
    fn draw(rng: &mut SmallRng, position: Cell, config: &SugarScapeConfig) -> Self {
        let wealth = i64::from(config.initial_wealth.sample(rng));
        let metabolic_rate = config.metabolic_rate.sample(rng);
        let vision = config.vision.sample(rng);
        let max_age = config.max_age.sample(rng);
        Self {
            position,
            vision,
            metabolic_rate,
            age: 0,
            max_age,
            wealth,
        }
    }

    /// True when the agent has starved or reached its maximum age.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.wealth <= 0 || self.age >= self.max_age
    }
}

/// Set of live agents plus a cell occupancy index enforcing the
/// at-most-one-agent-per-cell invariant.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: SlotMap<AgentId, Agent>,
    occupancy: Vec<Option<AgentId>>,
    grid: Grid,
}

impl AgentRegistry {
    fn new(grid: Grid) -> Self {
        Self {
            agents: SlotMap::with_key(),
            occupancy: vec![None; grid.cell_count()],
            grid,
        }
    }

    /// Number of live agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Returns true if `id` refers to a live agent.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Borrow a live agent.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// The agent occupying `cell`, if any.
    #[must_use]
    pub fn agent_at(&self, cell: Cell) -> Option<AgentId> {
        self.occupancy[self.grid.index_of(cell)]
    }

    /// Returns true when no agent occupies `cell`.
    #[must_use]
    pub fn is_cell_empty(&self, cell: Cell) -> bool {
        self.agent_at(cell).is_none()
    }

    /// Iterate over live agents in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.agents.iter()
    }

    /// Collect the current live handles in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<AgentId> {
        self.agents.keys().collect()
    }

    /// All currently empty cells, in row-major order.
    #[must_use]
    pub fn empty_cells(&self) -> Vec<Cell> {
        self.occupancy
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| self.grid.cell_at(index))
            .collect()
    }

    /// Insert a new agent at its position, returning its handle.
    ///
    /// Panics if the position is out of bounds or occupied; a violation here
    /// means corrupted state, not a user-facing condition.
    fn insert(&mut self, agent: Agent) -> AgentId {
        assert!(
            self.grid.contains(agent.position),
            "agent position out of bounds"
        );
        let index = self.grid.index_of(agent.position);
        assert!(
            self.occupancy[index].is_none(),
            "occupancy invariant violated: cell already occupied"
        );
        let id = self.agents.insert(agent);
        self.occupancy[index] = Some(id);
        id
    }

    /// Remove `id`, freeing its cell, and return its final state.
    fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let agent = self.agents.remove(id)?;
        self.occupancy[self.grid.index_of(agent.position)] = None;
        Some(agent)
    }

    /// Move `id` to `dest`, vacating its old cell and occupying the new one
    /// with no intermediate double-occupancy. Moving onto the agent's own
    /// cell is a no-op.
    fn move_agent(&mut self, id: AgentId, dest: Cell) {
        assert!(self.grid.contains(dest), "destination out of bounds");
        let dest_index = self.grid.index_of(dest);
        let occupant = self.occupancy[dest_index];
        assert!(
            occupant.is_none() || occupant == Some(id),
            "occupancy invariant violated: destination already occupied"
        );
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let from_index = self.grid.index_of(agent.position);
        agent.position = dest;
        self.occupancy[from_index] = None;
        self.occupancy[dest_index] = Some(id);
    }
}

/// Discrete simulation time, starting at zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Aggregate statistics emitted after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    /// Replacements skipped because no empty cell existed.
    pub skipped_replacements: usize,
    pub total_wealth: i64,
    pub mean_wealth: f64,
    pub total_sugar: u64,
}

/// Copy of one agent's full attribute record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub agent: Agent,
}

/// Payload delivered to observers after every step.
#[derive(Debug, Clone)]
pub struct StepBatch {
    pub summary: TickSummary,
    pub agents: Vec<AgentSnapshot>,
}

/// Read-only collection hook invoked after each step.
pub trait WorldObserver: Send {
    fn on_step(&mut self, batch: &StepBatch);
}

/// No-op observer.
#[derive(Debug, Default)]
pub struct NullObserver;

impl WorldObserver for NullObserver {
    fn on_step(&mut self, _batch: &StepBatch) {}
}

/// Aggregate world state: field, registry, RNG, and step scheduler.
pub struct WorldState {
    config: SugarScapeConfig,
    grid: Grid,
    tick: Tick,
    rng: SmallRng,
    sugar: SugarGrid,
    registry: AgentRegistry,
    observer: Box<dyn WorldObserver>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("agent_count", &self.registry.len())
            .finish()
    }
}

impl WorldState {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: SugarScapeConfig) -> Result<Self, WorldError> {
        Self::with_observer(config, Box::new(NullObserver))
    }

    /// Instantiate a new world with an attached step observer.
    pub fn with_observer(
        config: SugarScapeConfig,
        observer: Box<dyn WorldObserver>,
    ) -> Result<Self, WorldError> {
        let grid = config.validate()?;
        let sugar = SugarGrid::build(&grid, &config.peaks, config.max_sugar, config.decay_divisor);
        let mut rng = config.seeded_rng();
        let mut registry = AgentRegistry::new(grid);
        for _ in 0..config.population {
            // validate() guarantees population <= cell count, so a free cell
            // always exists during seeding.
            let empties = registry.empty_cells();
            let cell = empties[rng.random_range(0..empties.len())];
            let agent = Agent::draw(&mut rng, cell, &config);
            registry.insert(agent);
        }
        let history_capacity = config.history_capacity;
        Ok(Self {
            grid,
            tick: Tick::zero(),
            rng,
            sugar,
            registry,
            observer,
            history: VecDeque::with_capacity(history_capacity),
            config,
        })
    }

    /// Advance the simulation by exactly one step.
    ///
    /// Grows the field, then visits a shuffled snapshot of the live agents,
    /// applying foraging and then the replacement check to each. Agents born
    /// mid-step are not visited until the next step.
    pub fn step(&mut self) -> TickSummary {
        let next_tick = self.tick.next();
        self.sugar.grow(self.config.growth_rate);

        let mut order = self.registry.handles();
        order.shuffle(&mut self.rng);

        let mut births = 0usize;
        let mut deaths = 0usize;
        let mut skipped = 0usize;
        for id in order {
            if !self.registry.contains(id) {
                continue;
            }
            self.forage(id);
            if self.registry.get(id).is_some_and(Agent::is_dead) {
                self.registry.remove(id);
                deaths += 1;
                match self.spawn_replacement() {
                    Ok(_) => births += 1,
                    Err(err) => {
                        warn!(tick = next_tick.0, error = %err, "replacement skipped");
                        skipped += 1;
                    }
                }
            }
        }

        self.tick = next_tick;
        let summary = self.summarize(births, deaths, skipped);
        let batch = StepBatch {
            summary: summary.clone(),
            agents: self.snapshot_agents(),
        };
        self.observer.on_step(&batch);
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        summary
    }

    /// Greedy foraging for one agent: move to the first maximum-level empty
    /// cell in scan order, harvest it, pay metabolism, and age by one.
    fn forage(&mut self, id: AgentId) {
        let Some(agent) = self.registry.get(id) else {
            return;
        };
        let origin = agent.position;
        let vision = agent.vision;
        let metabolic_rate = agent.metabolic_rate;

        let registry = &self.registry;
        let sugar = &self.sugar;
        let mut best: Option<(Cell, u32)> = None;
        self.grid.for_each_in_range(origin, vision, &mut |cell| {
            // The agent's own cell counts as empty to itself.
            if cell != origin && registry.agent_at(cell).is_some() {
                return;
            }
            let level = sugar.level_at(cell);
            let better = match best {
                Some((_, best_level)) => level > best_level,
                None => true,
            };
            if better {
                best = Some((cell, level));
            }
        });

        // The origin always qualifies, so a destination exists; a missing
        // candidate means broken neighborhood geometry.
        let (destination, _) = best.expect("origin is always a foraging candidate");
        self.registry.move_agent(id, destination);
        let harvested = self.sugar.harvest(destination);
        if let Some(agent) = self.registry.get_mut(id) {
            agent.wealth += i64::from(harvested) - i64::from(metabolic_rate);
            agent.age += 1;
        }
    }

    /// Insert a fresh agent at a uniformly random empty cell.
    fn spawn_replacement(&mut self) -> Result<AgentId, WorldError> {
        let empties = self.registry.empty_cells();
        if empties.is_empty() {
            return Err(WorldError::CapacityExhausted);
        }
        let cell = empties[self.rng.random_range(0..empties.len())];
        let agent = Agent::draw(&mut self.rng, cell, &self.config);
        Ok(self.registry.insert(agent))
    }

    fn summarize(&self, births: usize, deaths: usize, skipped: usize) -> TickSummary {
        let population = self.registry.len();
        let total_wealth: i64 = self.registry.iter().map(|(_, agent)| agent.wealth).sum();
        let mean_wealth = if population > 0 {
            total_wealth as f64 / population as f64
        } else {
            0.0
        };
        TickSummary {
            tick: self.tick,
            population,
            births,
            deaths,
            skipped_replacements: skipped,
            total_wealth,
            mean_wealth,
            total_sugar: self.sugar.total(),
        }
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &SugarScapeConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Grid geometry.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Immutable access to the sugar field.
    #[must_use]
    pub fn sugar(&self) -> &SugarGrid {
        &self.sugar
    }

    /// Read-only access to the agent registry.
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Borrow a single live agent.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.registry.get(id)
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.registry.len()
    }

    /// Copy out the full attribute record of every live agent, in slot order.
    #[must_use]
    pub fn snapshot_agents(&self) -> Vec<AgentSnapshot> {
        self.registry
            .iter()
            .map(|(id, agent)| AgentSnapshot { id, agent: *agent })
            .collect()
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Replace the step observer.
    pub fn set_observer(&mut self, observer: Box<dyn WorldObserver>) {
        self.observer = observer;
    }

    /// Insert a caller-constructed agent, for harness-driven setups.
    pub fn spawn_agent_at(&mut self, agent: Agent) -> Result<AgentId, WorldError> {
        if !self.grid.contains(agent.position) || !self.registry.is_cell_empty(agent.position) {
            return Err(WorldError::InvalidConfig(
                "spawn position must be an in-bounds empty cell",
            ));
        }
        Ok(self.registry.insert(agent))
    }

    /// Remove an agent by handle, returning its final state.
    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        self.registry.remove(id)
    }
}
