//! Discrete-event simulation kernel.
//!
//! Three cooperating processes drive one replica: a daily demand tick, a
//! daily replenishment check, and a Poisson-arrival disruption process that
//! blocks the route for a triangular-distributed duration. A fourth, purely
//! reactive kind (supply arrival) delivers orders placed by the
//! replenishment process. All four are represented as entries in a single
//! time-ordered event queue rather than as separate coroutines — there is
//! exactly one thread per replica, and the queue is the only scheduler.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::PI;

use crate::config::{SimulationConfig, MAX_CONCURRENT_ORDERS, SAFETY_MARGIN};
use crate::rng::SimRng;
use crate::sim::container::InventoryContainer;
use crate::sim::route::Route;
use crate::sim::types::{DailyMetrics, OrderInTransit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    DemandTick,
    ReplenishmentTick,
    SupplyArrival { order_id: u64 },
    DisruptionArrival,
}

impl EventKind {
    /// Tie-break order for events landing at the same simulated instant,
    /// matching the order the three standing processes are started in and
    /// placing reactive supply arrivals after the tick that may have
    /// spawned them.
    fn priority(&self) -> u8 {
        match self {
            EventKind::DemandTick => 0,
            EventKind::ReplenishmentTick => 1,
            EventKind::SupplyArrival { .. } => 2,
            EventKind::DisruptionArrival => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledEvent {
    time: f64,
    priority: u8,
    seq: u64,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    /// Reversed so a `BinaryHeap` (a max-heap) pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Aggregate totals and the day-by-day record produced by one kernel run.
#[derive(Debug, Clone)]
pub struct KernelOutput {
    pub daily_metrics: Vec<DailyMetrics>,
    pub total_demand_tm: f64,
    pub satisfied_demand_tm: f64,
    pub total_received_tm: f64,
    pub total_dispatched_tm: f64,
    pub final_inventory_tm: f64,
    pub total_disruptions: u32,
    pub total_blocked_days: f64,
}

/// One simulation replica's mutable state.
pub struct Kernel<'a> {
    config: &'a SimulationConfig,
    rng: SimRng,
    inventory: InventoryContainer,
    total_received_tm: f64,
    total_dispatched_tm: f64,
    route: Route,
    orders_in_transit: Vec<OrderInTransit>,
    next_order_id: u64,
    daily_metrics: Vec<DailyMetrics>,
    total_demand_tm: f64,
    satisfied_demand_tm: f64,
    events: BinaryHeap<ScheduledEvent>,
    event_seq: u64,
}

impl<'a> Kernel<'a> {
    /// Builds a kernel ready to run, seeded from `config.seed`.
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self {
            config,
            rng: SimRng::new(config.seed),
            inventory: InventoryContainer::new(config.capacity_tm, config.initial_inventory_tm),
            total_received_tm: 0.0,
            total_dispatched_tm: 0.0,
            route: Route::new(),
            orders_in_transit: Vec::new(),
            next_order_id: 0,
            daily_metrics: Vec::with_capacity(config.simulation_days as usize),
            total_demand_tm: 0.0,
            satisfied_demand_tm: 0.0,
            events: BinaryHeap::new(),
            event_seq: 0,
        }
    }

    /// Runs the simulation to the configured horizon and returns the
    /// accumulated output. Consumes the kernel — a replica is run once.
    pub fn run(mut self) -> KernelOutput {
        let horizon = self.config.simulation_days as f64;

        self.push_event(0.0, EventKind::DemandTick);
        self.push_event(0.0, EventKind::ReplenishmentTick);
        self.schedule_next_disruption(0.0);

        while let Some(event) = self.events.pop() {
            if event.time >= horizon {
                break;
            }
            match event.kind {
                EventKind::DemandTick => self.handle_demand_tick(event.time),
                EventKind::ReplenishmentTick => self.handle_replenishment_tick(event.time),
                EventKind::SupplyArrival { order_id } => self.handle_supply_arrival(order_id),
                EventKind::DisruptionArrival => self.handle_disruption_arrival(event.time),
            }
        }

        KernelOutput {
            daily_metrics: self.daily_metrics,
            total_demand_tm: self.total_demand_tm,
            satisfied_demand_tm: self.satisfied_demand_tm,
            total_received_tm: self.total_received_tm,
            total_dispatched_tm: self.total_dispatched_tm,
            final_inventory_tm: self.inventory.level(),
            total_disruptions: self.route.total_disruptions(),
            total_blocked_days: self.route.total_blocked_days(),
        }
    }

    fn push_event(&mut self, time: f64, kind: EventKind) {
        let seq = self.event_seq;
        self.event_seq += 1;
        self.events.push(ScheduledEvent {
            time,
            priority: kind.priority(),
            seq,
            kind,
        });
    }

    fn calculate_demand(&mut self, day: u32) -> f64 {
        let base = self.config.base_daily_demand_tm;
        let seasonal = if self.config.use_seasonality {
            let phase = 2.0 * PI * (day as f64 - self.config.peak_winter_day as f64) / 365.0;
            1.0 + self.config.seasonal_amplitude * phase.sin()
        } else {
            1.0
        };
        let noise = self.rng.normal(1.0, self.config.demand_variability);
        (base * seasonal * noise).max(0.0)
    }

    fn inventory_in_transit(&self) -> f64 {
        self.orders_in_transit.iter().map(|o| o.quantity_tm).sum()
    }

    fn position_inventory(&self) -> f64 {
        self.inventory.level() + self.inventory_in_transit()
    }

    fn dynamic_order_quantity(&self, now: f64) -> f64 {
        let effective_lt = self.route.lead_time(now, self.config.nominal_lead_time_days);
        let demand_during_lt = self.config.base_daily_demand_tm * effective_lt;
        let q = demand_during_lt * (1.0 + SAFETY_MARGIN);
        let available_capacity = self.config.capacity_tm - self.inventory.level();
        q.min(available_capacity).max(0.0)
    }

    fn handle_demand_tick(&mut self, now: f64) {
        let day = now.round() as u32;
        let demand = self.calculate_demand(day);
        let dispatched = self.dispatch(demand);
        self.total_demand_tm += demand;
        self.satisfied_demand_tm += dispatched;

        let inv = self.inventory.level();
        let autonomy = if demand > 0.0 { inv / demand } else { 0.0 };
        let route_blocked = self.route.is_blocked_at(now);

        self.daily_metrics.push(DailyMetrics {
            day,
            inventory_tm: inv,
            demand_tm: demand,
            satisfied_demand_tm: dispatched,
            supply_received_tm: 0.0,
            stockout: dispatched < demand,
            route_blocked,
            pending_orders: self.orders_in_transit.len(),
            autonomy_days: autonomy,
        });

        self.push_event(now + 1.0, EventKind::DemandTick);
    }

    fn dispatch(&mut self, demand_tm: f64) -> f64 {
        let dispatched = self.inventory.get(demand_tm);
        self.total_dispatched_tm += dispatched;
        dispatched
    }

    fn handle_replenishment_tick(&mut self, now: f64) {
        let position = self.position_inventory();
        let can_order = position <= self.config.reorder_point_tm
            && self.orders_in_transit.len() < MAX_CONCURRENT_ORDERS
            && self.route.is_operational(now);

        if can_order {
            let quantity = self.dynamic_order_quantity(now);
            if quantity > 0.0 {
                let lead_time = self.route.lead_time(now, self.config.nominal_lead_time_days);
                let order_id = self.next_order_id;
                self.next_order_id += 1;
                self.orders_in_transit.push(OrderInTransit {
                    id: order_id,
                    quantity_tm: quantity,
                    lead_time_days: lead_time,
                    creation_day: now,
                });
                self.push_event(now + lead_time, EventKind::SupplyArrival { order_id });
            }
        }

        self.push_event(now + 1.0, EventKind::ReplenishmentTick);
    }

    fn handle_supply_arrival(&mut self, order_id: u64) {
        let Some(idx) = self.orders_in_transit.iter().position(|o| o.id == order_id) else {
            return;
        };
        let order = self.orders_in_transit.remove(idx);
        self.inventory.put(order.quantity_tm);
        self.total_received_tm += order.quantity_tm;
        if let Some(last) = self.daily_metrics.last_mut() {
            last.supply_received_tm += order.quantity_tm;
        }
    }

    fn handle_disruption_arrival(&mut self, now: f64) {
        let duration = if self.config.disruption_min_days == self.config.disruption_mode_days
            && self.config.disruption_mode_days == self.config.disruption_max_days
        {
            self.config.disruption_max_days
        } else {
            self.rng.triangular(
                self.config.disruption_min_days,
                self.config.disruption_mode_days,
                self.config.disruption_max_days,
            )
        };
        self.route.block(now, duration);
        self.schedule_next_disruption(now);
    }

    fn schedule_next_disruption(&mut self, from_time: f64) {
        if self.config.disruption_max_days <= 0.0 || self.config.annual_disruption_rate <= 0.0 {
            return;
        }
        let lambda_days = self.config.annual_disruption_rate / 365.0;
        let time_to_next = self.rng.exponential(1.0 / lambda_days);
        self.push_event(from_time + time_to_next, EventKind::DisruptionArrival);
    }
}
