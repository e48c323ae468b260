//! Per-second countdown through the final minute before a prayer.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::scheduler::{
  BackgroundUpdateScheduler, Flow, SchedulerCommand, SchedulerMode, ESCALATION_WINDOW_MS,
};

/// Upper bound on countdown iterations (one per second plus the final one).
const MAX_TICKS: u32 = 61;

/// Hard stop for the countdown regardless of ticks.
const COUNTDOWN_DEADLINE: Duration = Duration::from_secs(65);

impl BackgroundUpdateScheduler {
  /// Run the countdown for the current next prayer, then return to
  /// periodic polling. Returns `false` if shutdown was requested meanwhile.
  ///
  /// Commands keep being served while counting down. A pushed schedule
  /// takes effect on the next tick: the target follows it, and the countdown
  /// ends early if the new next prayer is more than a minute away.
  pub(super) async fn run_countdown(&mut self, commands: &mut mpsc::Receiver<SchedulerCommand>) -> bool {
    let mut target = match self.state.next_target(self.clock.now_ms()) {
      Some(target) => target.clone(),
      None => return true,
    };

    self.mode = SchedulerMode::CountdownEscalated;
    info!(prayer = %target.name, "Countdown started");

    let deadline = Instant::now() + COUNTDOWN_DEADLINE;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut ticks = 0;
    let mut running = true;

    while ticks < MAX_TICKS {
      tokio::select! {
        _ = ticker.tick() => {}
        cmd = commands.recv() => {
          match cmd {
            Some(cmd) => match self.apply_command(cmd).await {
              Flow::Shutdown => {
                running = false;
                break;
              }
              Flow::Continue | Flow::Wake(_) => {}
            },
            None => {
              running = false;
              break;
            }
          }
          if !self.has_consumers() {
            debug!("Countdown abandoned, nothing left to update");
            return running;
          }
          continue;
        }
        _ = tokio::time::sleep_until(deadline) => break,
      }

      ticks += 1;
      let now = self.clock.now_ms();

      if target.time_ms <= now {
        self.advance_and_persist(now).await;
        self.render(now).await;
        self.send_due_alerts(now).await;
        break;
      }

      match self.state.next_target(now) {
        Some(live) if live.time_ms - now <= ESCALATION_WINDOW_MS => {
          if live.time_ms != target.time_ms {
            debug!(prayer = %live.name, "Countdown target moved");
            target = live.clone();
          }
        }
        _ => {
          debug!(prayer = %target.name, "Left the countdown window");
          self.advance_and_persist(now).await;
          self.render(now).await;
          break;
        }
      }
      self.render(now).await;
    }

    self.mode = SchedulerMode::PeriodicPolling;
    if running {
      let now = self.clock.now_ms();
      self.schedule_alarms(now, self.state.time_to_next_ms(now));
    }
    info!(prayer = %target.name, "Countdown finished");
    running
  }
}
