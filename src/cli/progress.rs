use ava::data::PipelineEvent;
use std::time::Instant;

/// Prints pipeline progress for humans, driven by pipeline events
pub struct ProgressIndicator {
    total: usize,
    completed: usize,
    failed: usize,
    verbose: bool,
    start_time: Instant,
}

impl ProgressIndicator {
    pub fn new(verbose: bool) -> Self {
        Self {
            total: 0,
            completed: 0,
            failed: 0,
            verbose,
            start_time: Instant::now(),
        }
    }

    pub fn handle(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ContractReady { files } => {
                self.total = files.len();
                println!("Planned {} file(s)", self.total);
                if self.verbose {
                    for file in files {
                        println!("  - {}", file);
                    }
                }
            }
            PipelineEvent::AgentStatusChanged { agent, status } if self.verbose => {
                println!("[{}] {}", agent, status);
            }
            PipelineEvent::ActivityStarted { file, .. } => self.start_item(file),
            PipelineEvent::ReviewCompleted {
                attempt,
                approved: false,
                feedback,
                ..
            } => {
                println!("  ✗ Attempt {} rejected", attempt);
                if let (true, Some(feedback)) = (self.verbose, feedback) {
                    for line in feedback.lines() {
                        println!("    {}", line);
                    }
                }
            }
            PipelineEvent::FileIntegrated { file, new_symbols } => {
                self.completed += 1;
                if self.verbose {
                    println!("  ✓ {} ({} new symbol(s))", file, new_symbols);
                } else {
                    println!("  ✓ {}", file);
                }
            }
            PipelineEvent::WorkflowFinished { success, message } => {
                if !success {
                    self.failed = self.total.saturating_sub(self.completed).max(1);
                    eprintln!("✗ {}", message);
                }
            }
            _ => {}
        }
    }

    fn start_item(&self, name: &str) {
        println!(
            "Processing: {} ({}/{})",
            name,
            self.completed + self.failed + 1,
            self.total
        );
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Total:     {}", self.total);
        println!("  Succeeded: {}", self.completed);
        println!("  Failed:    {}", self.failed);
        println!("  Duration:  {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}
