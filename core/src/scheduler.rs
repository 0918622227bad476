//! C4: picks machines for containers under constraints, spreading load
//! (§4.4).
//!
//! The "build a heap lazily, pop best, re-push unless it's gone bad" shape
//! mirrors the teacher's `helpers::action_state` busy-guard pattern in
//! spirit (reserve on acquire, release on drop) though here the guard is
//! explicit (`unschedule_container`) rather than RAII, since the planner
//! is synchronous and doesn't need a scope guard to survive a panic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use cluster_client::MachineEntry;

use crate::state::{self, Constraint};

/// `less(a, b)` from §4.4: fewer existing+scheduled containers ranks
/// better. Implementers may swap this for a different cost function; the
/// scheduler only needs total ordering plus a tie-break on position.
pub trait Ranker {
  fn cost(&self, entry: &MachineEntry) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadRanker;

impl Ranker for SpreadRanker {
  fn cost(&self, entry: &MachineEntry) -> u64 {
    (entry.existing_containers + entry.scheduled_containers) as u64
  }
}

struct HeapEntry {
  cost: u64,
  position: usize,
}

impl PartialEq for HeapEntry {
  fn eq(&self, other: &Self) -> bool {
    self.cost == other.cost && self.position == other.position
  }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    // `BinaryHeap` is a max-heap; invert cost so the lowest-cost machine
    // pops first, and invert position so ties keep the state's natural
    // (input) order.
    other
      .cost
      .cmp(&self.cost)
      .then_with(|| other.position.cmp(&self.position))
  }
}
impl PartialOrd for HeapEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Adds a container's CPU/memory reservation to a machine's transient
/// scheduling counters (§4.4 "ScheduleContainer"). Exposed standalone so
/// callers that pick a machine by their own policy (C5's round-robin
/// and per-machine reconciliation) can still track "live reservation of
/// CPU/memory" (§2) without going through the ranked heap.
pub fn reserve(entry: &mut MachineEntry, cpu_nanos: u64, memory_bytes: u64) {
  entry.scheduled_cpu_nanos += cpu_nanos;
  entry.scheduled_memory_bytes += memory_bytes;
  entry.scheduled_containers += 1;
}

/// Reverses [`reserve`] (§4.4 "UnscheduleContainer").
pub fn release(entry: &mut MachineEntry, cpu_nanos: u64, memory_bytes: u64) {
  entry.scheduled_cpu_nanos = entry.scheduled_cpu_nanos.saturating_sub(cpu_nanos);
  entry.scheduled_memory_bytes =
    entry.scheduled_memory_bytes.saturating_sub(memory_bytes);
  entry.scheduled_containers = entry.scheduled_containers.saturating_sub(1);
}

/// True if `entry` has room for one more container needing this much
/// reserved CPU/memory (§4.3 "Resource").
pub fn has_capacity(entry: &MachineEntry, cpu_nanos: u64, memory_bytes: u64) -> bool {
  cpu_nanos <= entry.available_cpu_nanos()
    && memory_bytes <= entry.available_memory_bytes()
}

pub struct Scheduler<'a, R: Ranker = SpreadRanker> {
  machines: &'a mut [MachineEntry],
  constraints: Vec<Constraint>,
  ranker: R,
  heap: Option<BinaryHeap<HeapEntry>>,
  cpu_nanos: u64,
  memory_bytes: u64,
}

impl<'a> Scheduler<'a, SpreadRanker> {
  pub fn new(
    machines: &'a mut [MachineEntry],
    constraints: Vec<Constraint>,
    cpu_nanos: u64,
    memory_bytes: u64,
  ) -> Self {
    Self::with_ranker(
      machines,
      constraints,
      SpreadRanker,
      cpu_nanos,
      memory_bytes,
    )
  }
}

impl<'a, R: Ranker> Scheduler<'a, R> {
  pub fn with_ranker(
    machines: &'a mut [MachineEntry],
    constraints: Vec<Constraint>,
    ranker: R,
    cpu_nanos: u64,
    memory_bytes: u64,
  ) -> Self {
    Scheduler {
      machines,
      constraints,
      ranker,
      heap: None,
      cpu_nanos,
      memory_bytes,
    }
  }

  /// `EligibleMachines()` (§4.4): machines passing every constraint, or
  /// `Err(report)` enumerating which constraint each machine failed.
  pub fn eligible_machines(&self) -> Result<Vec<usize>, String> {
    let eligible: Vec<usize> = self
      .machines
      .iter()
      .enumerate()
      .filter(|(_, entry)| {
        self.constraints.iter().all(|c| c.evaluate(entry).satisfied)
      })
      .map(|(i, _)| i)
      .collect();

    if eligible.is_empty() {
      Err(state::unsatisfied_report(self.machines, &self.constraints))
    } else {
      Ok(eligible)
    }
  }

  fn build_heap(&mut self) -> Result<(), String> {
    let eligible = self.eligible_machines()?;
    let heap = eligible
      .into_iter()
      .map(|position| HeapEntry {
        cost: self.ranker.cost(&self.machines[position]),
        position,
      })
      .collect();
    self.heap = Some(heap);
    Ok(())
  }

  fn entry_still_eligible(&self, position: usize) -> bool {
    self
      .constraints
      .iter()
      .all(|c| c.evaluate(&self.machines[position]).satisfied)
  }

  /// `ScheduleContainer()` (§4.4): pop the best machine, reserve the
  /// container's resources on it, and re-push. Returns the machine's
  /// index into the slice this scheduler was built over.
  pub fn schedule_container(&mut self) -> Result<usize, String> {
    if self.heap.is_none() {
      self.build_heap()?;
    }

    loop {
      let popped = self.heap.as_mut().expect("heap initialized above").pop();
      let popped = match popped {
        Some(popped) => popped,
        None => {
          // Heap empty: state may have changed via reservations made
          // this call, re-run eligibility once before giving up (§4.4).
          self.build_heap()?;
          match self.heap.as_mut().expect("heap just rebuilt").pop() {
            Some(popped) => popped,
            None => {
              return Err(state::unsatisfied_report(
                self.machines,
                &self.constraints,
              ));
            }
          }
        }
      };

      let position = popped.position;
      self.reserve_and_maybe_repush(popped);
      if self.entry_still_eligible(position) {
        return Ok(position);
      }
      // The reservation just made pushed this machine over a constraint;
      // it was not re-pushed (see `reserve_and_maybe_repush`), so loop
      // and try the next-best machine.
    }
  }

  fn reserve_and_maybe_repush(&mut self, popped: HeapEntry) {
    let position = popped.position;
    reserve(&mut self.machines[position], self.cpu_nanos, self.memory_bytes);
    if self.entry_still_eligible(position) {
      let cost = self.ranker.cost(&self.machines[position]);
      self
        .heap
        .as_mut()
        .expect("heap initialized")
        .push(HeapEntry { cost, position });
    }
  }

  /// `UnscheduleContainer(machine)` (§4.4): release a reservation made
  /// earlier this call, re-pushing the machine if the heap exists.
  pub fn unschedule_container(&mut self, position: usize) {
    release(&mut self.machines[position], self.cpu_nanos, self.memory_bytes);
    if let Some(heap) = &mut self.heap {
      if self.entry_still_eligible(position) {
        let cost = self.ranker.cost(&self.machines[position]);
        heap.push(HeapEntry { cost, position });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::{Machine, MachineLiveness};

  fn machine_entry(id: &str, cpu: u64, mem: u64) -> MachineEntry {
    MachineEntry::new(Machine {
      id: id.to_string(),
      name: id.to_string(),
      total_cpu_nanos: cpu,
      total_memory_bytes: mem,
      reserved_cpu_nanos: 0,
      reserved_memory_bytes: 0,
      public_ip: None,
      management_ip: "10.0.0.1".to_string(),
      state: MachineLiveness::Up,
      volumes: vec![],
    })
  }

  #[test]
  fn spreads_across_machines() {
    let mut machines =
      vec![machine_entry("m1", 4_000_000_000, 8_000_000_000), machine_entry(
        "m2",
        4_000_000_000,
        8_000_000_000,
      )];
    let mut scheduler = Scheduler::new(&mut machines, vec![], 0, 0);
    let first = scheduler.schedule_container().unwrap();
    let second = scheduler.schedule_container().unwrap();
    assert_ne!(first, second);
  }

  #[test]
  fn reservation_tracked_on_chosen_machine() {
    let mut machines = vec![machine_entry("m1", 4_000_000_000, 8_000_000_000)];
    let mut scheduler =
      Scheduler::new(&mut machines, vec![], 1_000_000_000, 2_000_000_000);
    let chosen = scheduler.schedule_container().unwrap();
    assert_eq!(chosen, 0);
    assert_eq!(machines[0].scheduled_cpu_nanos, 1_000_000_000);
    assert_eq!(machines[0].scheduled_memory_bytes, 2_000_000_000);
  }

  #[test]
  fn fails_when_no_eligible_machine() {
    let mut machines = vec![machine_entry("m1", 100, 100)];
    let mut scheduler =
      Scheduler::new(&mut machines, vec![], 1_000_000_000, 1_000_000_000);
    assert!(scheduler.schedule_container().is_err());
  }

  #[test]
  fn unschedule_resets_counters() {
    let mut machines = vec![machine_entry("m1", 4_000_000_000, 8_000_000_000)];
    let mut scheduler =
      Scheduler::new(&mut machines, vec![], 1_000_000_000, 1_000_000_000);
    let chosen = scheduler.schedule_container().unwrap();
    scheduler.unschedule_container(chosen);
    assert_eq!(machines[0].scheduled_cpu_nanos, 0);
    assert_eq!(machines[0].scheduled_containers, 0);
  }
}
