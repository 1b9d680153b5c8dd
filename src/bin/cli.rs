use chrono::{DateTime, Utc};
use machine_scheduler::persistence::{
    load_busy_intervals_from_csv, load_operations_from_csv,
    load_production_from_json, load_window_config, regenerate_plan, save_production_to_json,
    save_schedule_to_csv, save_window_config, sqlite::SqliteScheduleStore,
};
use machine_scheduler::{
    AssignmentMode, BusyInterval, FixedClock, Operation, ProductionSchedule, ScheduleAssigner,
    ScheduledOperation, Timestamp, WindowConfig, WorkWindow, logging,
};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

const NOW_ENV: &str = "MACHINE_SCHEDULER_NOW";

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, headers.iter().copied()));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(&widths, row.iter().map(String::as_str)));
        out.push('\n');
    }
    out.push_str(&sep);
    out
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.enumerate() {
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        line.push_str(" |");
    }
    line
}

fn render_operations(operations: &[Operation]) -> String {
    let rows: Vec<Vec<String>> = operations
        .iter()
        .map(|op| {
            vec![
                op.plan_id.clone(),
                op.id.clone(),
                op.sequence.to_string(),
                op.machine_id.clone(),
                op.duration_hours.to_string(),
                op.declared_start
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    render_table(
        &["plan", "operation", "seq", "machine", "hours", "declared_start"],
        &rows,
    )
}

fn render_schedule(scheduled: &[ScheduledOperation]) -> String {
    let rows: Vec<Vec<String>> = scheduled
        .iter()
        .map(|entry| {
            vec![
                entry.plan_id().to_string(),
                entry.id().to_string(),
                entry.sequence().to_string(),
                entry.machine_id().to_string(),
                entry.assigned_start.format("%Y-%m-%d %H:%M").to_string(),
                entry.assigned_end.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    render_table(
        &["plan", "operation", "seq", "machine", "start", "end"],
        &rows,
    )
}

fn render_busy(intervals: &[BusyInterval]) -> String {
    let rows: Vec<Vec<String>> = intervals
        .iter()
        .map(|interval| {
            vec![
                interval.machine_id.clone(),
                interval.start.to_rfc3339(),
                interval.end.to_rfc3339(),
            ]
        })
        .collect();
    render_table(&["machine", "start", "end"], &rows)
}

fn print_help() {
    println!(
        "Commands:\n  help                                       Show this help\n  show [plan]                                List operations (all plans or one)\n  add <plan> <op> <seq> <machine> <hours> [start]\n                                             Upsert an operation (start: RFC 3339 or YYYY-MM-DDTHH:MM)\n  delete <plan> <op>                         Delete an operation\n  machine add <id>                           Register a machine\n  machine list                               List registered machines\n  busy add <machine> <start> <end>           Record busy time on a machine\n  busy list                                  List recorded busy time\n  window show                                Show the daily working window\n  window set <HH:MM> <hours> [offset_min]    Change the daily working window\n  window save <json_path>                    Save window config to JSON\n  window load <json_path>                    Load window config from JSON\n  mode [machine_aware|simplified]            Show or change the assignment mode\n  generate <plan>                            Regenerate a plan's schedule\n  schedule <plan>                            Show a plan's committed schedule\n  clear <plan>                               Drop a plan's committed schedule\n  save json <path>                           Save the whole workspace to JSON\n  save csv <path>                            Save every committed entry to CSV\n  load json <path>                           Load a workspace from JSON\n  import ops <csv_path>                      Import operations from CSV\n  import busy <csv_path>                     Import busy intervals from CSV\n  db push <sqlite_path> <plan>               Copy window, busy time and plan operations into SQLite\n  db regenerate <sqlite_path> <plan>         Regenerate a plan inside SQLite\n  db show <sqlite_path> <plan>               Show a plan's schedule stored in SQLite\n  quit|exit                                  Exit"
    );
}

fn print_window(config: &WindowConfig) {
    println!(
        "Window start       : {}",
        config.start_time().format("%H:%M")
    );
    println!("Daily hours        : {}", config.daily_duration_hours());
    println!("UTC offset minutes : {}", config.utc_offset_minutes());
}

fn workspace_clock() -> Option<FixedClock> {
    let raw = std::env::var(NOW_ENV).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| FixedClock(t.with_timezone(&Utc)))
}

fn parse_instant(schedule: &ProductionSchedule, input: &str) -> Result<Timestamp, String> {
    let window = WorkWindow::from_config(schedule.window_config()).map_err(|e| e.to_string())?;
    window
        .parse_timestamp(input)
        .ok_or_else(|| format!("Invalid timestamp '{input}'"))
}

fn db_push(schedule: &ProductionSchedule, path: &str, plan_id: &str) -> Result<usize, String> {
    let store = SqliteScheduleStore::new(path).map_err(|e| e.to_string())?;
    store
        .save_window_config(schedule.window_config())
        .map_err(|e| e.to_string())?;
    let operations = schedule.operations(plan_id);
    for op in &operations {
        store.upsert_operation(op).map_err(|e| e.to_string())?;
    }
    store
        .replace_busy_intervals(schedule.busy_intervals())
        .map_err(|e| e.to_string())?;
    Ok(operations.len())
}

fn db_regenerate(
    schedule: &ProductionSchedule,
    path: &str,
    plan_id: &str,
) -> Result<(String, Vec<ScheduledOperation>), String> {
    let store = SqliteScheduleStore::new(path).map_err(|e| e.to_string())?;
    let config = store
        .load_window_config()
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| schedule.window_config().clone());
    let mut assigner = ScheduleAssigner::from_config(&config)
        .map_err(|e| e.to_string())?
        .with_mode(schedule.mode())
        .with_clock(schedule.clock());
    if !schedule.registry().is_empty() {
        assigner = assigner.with_registry(schedule.registry().clone());
    }
    let outcome = regenerate_plan(&store, plan_id, &assigner).map_err(|e| e.to_string())?;
    Ok((outcome.summary.to_cli_summary(), outcome.operations))
}

fn main() {
    logging::init_logging(None);

    let mut schedule = ProductionSchedule::new();
    if let Some(clock) = workspace_clock() {
        schedule.set_clock(Arc::new(clock));
    }

    println!("Machine Scheduler (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "show" => {
                let operations = match parts.next() {
                    Some(plan) => schedule.operations(plan),
                    None => schedule.all_operations().to_vec(),
                };
                println!("{}", render_operations(&operations));
            }
            "add" => {
                let args: Vec<&str> = parts.collect();
                if args.len() < 5 {
                    println!("Usage: add <plan> <op> <seq> <machine> <hours> [start]");
                    continue;
                }
                let sequence: i32 = match args[2].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        println!("Invalid sequence");
                        continue;
                    }
                };
                let hours: f64 = match args[4].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        println!("Invalid hours");
                        continue;
                    }
                };
                let mut operation = Operation::new(args[1], args[0], sequence, args[3], hours);
                if let Some(start) = args.get(5) {
                    match parse_instant(&schedule, start) {
                        Ok(ts) => operation = operation.with_declared_start(ts),
                        Err(e) => {
                            println!("{e}");
                            continue;
                        }
                    }
                }
                match schedule.upsert_operation(operation) {
                    Ok(_) => println!("Operation upserted."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "delete" => match (parts.next(), parts.next()) {
                (Some(plan), Some(op)) => {
                    if schedule.delete_operation(plan, op) {
                        println!("Deleted operation {op} from plan {plan}.");
                    } else {
                        println!("Operation {op} not found in plan {plan}.");
                    }
                }
                _ => println!("Usage: delete <plan> <op>"),
            },
            "machine" => match (parts.next(), parts.next()) {
                (Some("add"), Some(id)) => {
                    if schedule.register_machine(id) {
                        println!("Machine {id} registered.");
                    } else {
                        println!("Machine {id} already registered.");
                    }
                }
                (Some("list"), _) | (None, _) => {
                    let ids: Vec<&str> = schedule.registry().iter().collect();
                    if ids.is_empty() {
                        println!("No machines registered (any machine id is accepted).");
                    } else {
                        println!("Machines: {}", ids.join(", "));
                    }
                }
                _ => println!("Usage: machine add <id> | machine list"),
            },
            "busy" => match parts.next() {
                Some("add") => match (parts.next(), parts.next(), parts.next()) {
                    (Some(machine), Some(start), Some(end)) => {
                        let interval = parse_instant(&schedule, start).and_then(|s| {
                            parse_instant(&schedule, end).map(|e| BusyInterval::new(machine, s, e))
                        });
                        match interval {
                            Ok(interval) => match schedule.add_busy_interval(interval) {
                                Ok(_) => println!("Busy interval recorded."),
                                Err(e) => println!("Error: {}", e),
                            },
                            Err(e) => println!("{e}"),
                        }
                    }
                    _ => println!("Usage: busy add <machine> <start> <end>"),
                },
                Some("list") | None => println!("{}", render_busy(schedule.busy_intervals())),
                Some(other) => {
                    println!("Unknown busy command '{}'.", other);
                    println!("Usage: busy add <machine> <start> <end> | busy list");
                }
            },
            "window" => match parts.next() {
                Some("show") | None => print_window(schedule.window_config()),
                Some("set") => match (parts.next(), parts.next()) {
                    (Some(start), Some(hours_s)) => {
                        let hours: f64 = match hours_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid hours");
                                continue;
                            }
                        };
                        let offset: i32 = match parts.next().map(str::parse::<i32>).transpose() {
                            Ok(v) => v.unwrap_or(0),
                            Err(_) => {
                                println!("Invalid offset minutes");
                                continue;
                            }
                        };
                        let result = WindowConfig::parse(start, hours).and_then(|config| {
                            schedule.set_window_config(config.with_utc_offset_minutes(offset))
                        });
                        match result {
                            Ok(_) => {
                                println!("Window updated.");
                                print_window(schedule.window_config());
                            }
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    _ => println!("Usage: window set <HH:MM> <hours> [offset_min]"),
                },
                Some("save") => match parts.next() {
                    Some(path) => match save_window_config(schedule.window_config(), path) {
                        Ok(_) => println!("Window saved to {}.", path),
                        Err(e) => println!("Error writing {}: {}", path, e),
                    },
                    None => println!("Usage: window save <json_path>"),
                },
                Some("load") => match parts.next() {
                    Some(path) => {
                        let result = load_window_config(path)
                            .map_err(|e| e.to_string())
                            .and_then(|config| {
                                schedule.set_window_config(config).map_err(|e| e.to_string())
                            });
                        match result {
                            Ok(_) => {
                                println!("Window loaded from {}.", path);
                                print_window(schedule.window_config());
                            }
                            Err(e) => println!("Error loading window: {}", e),
                        }
                    }
                    None => println!("Usage: window load <json_path>"),
                },
                Some(other) => {
                    println!("Unknown window command '{}'.", other);
                    println!("Usage: window show|set <HH:MM> <hours> [offset_min]|save <path>|load <path>");
                }
            },
            "mode" => match parts.next() {
                None => println!("Mode: {}", schedule.mode()),
                Some(value) => match AssignmentMode::from_str(value) {
                    Ok(mode) => {
                        schedule.set_mode(mode);
                        println!("Mode set to {}.", mode);
                    }
                    Err(e) => println!("Error: {}", e),
                },
            },
            "generate" => match parts.next() {
                Some(plan) => match schedule.generate(plan) {
                    Ok(summary) => println!(
                        "Generated ({})\n{}",
                        summary.to_cli_summary(),
                        render_schedule(schedule.committed(plan))
                    ),
                    Err(e) => println!("Generate error: {}", e),
                },
                None => println!("Usage: generate <plan>"),
            },
            "schedule" => match parts.next() {
                Some(plan) => println!("{}", render_schedule(schedule.committed(plan))),
                None => println!("Usage: schedule <plan>"),
            },
            "clear" => match parts.next() {
                Some(plan) => {
                    if schedule.clear_schedule(plan) {
                        println!("Schedule of plan {plan} cleared.");
                    } else {
                        println!("No schedule committed for plan {plan}.");
                    }
                }
                None => println!("Usage: clear <plan>"),
            },
            "save" => match (parts.next(), parts.next()) {
                (Some("json"), Some(path)) => match save_production_to_json(&schedule, path) {
                    Ok(_) => println!("Saved workspace to {}.", path),
                    Err(e) => println!("Error saving JSON: {}", e),
                },
                (Some("csv"), Some(path)) => {
                    let entries: Vec<ScheduledOperation> =
                        schedule.all_committed().cloned().collect();
                    match save_schedule_to_csv(&entries, path) {
                        Ok(_) => println!("Saved {} entries to {}.", entries.len(), path),
                        Err(e) => println!("Error saving CSV: {}", e),
                    }
                }
                _ => println!("Usage: save <json|csv> <path>"),
            },
            "load" => match (parts.next(), parts.next()) {
                (Some("json"), Some(path)) => match load_production_from_json(path) {
                    Ok(mut loaded) => {
                        loaded.set_clock(schedule.clock());
                        schedule = loaded;
                        println!("Loaded workspace from {}.", path);
                        println!("{}", render_operations(schedule.all_operations()));
                    }
                    Err(e) => println!("Error loading JSON: {}", e),
                },
                _ => println!("Usage: load json <path>"),
            },
            "import" => match (parts.next(), parts.next()) {
                (Some("ops"), Some(path)) => match load_operations_from_csv(path) {
                    Ok(operations) => {
                        let total = operations.len();
                        let mut imported = 0;
                        for op in operations {
                            match schedule.upsert_operation(op) {
                                Ok(_) => imported += 1,
                                Err(e) => println!("Skipped: {}", e),
                            }
                        }
                        println!("Imported {imported} of {total} operations.");
                    }
                    Err(e) => println!("Error importing operations: {}", e),
                },
                (Some("busy"), Some(path)) => match load_busy_intervals_from_csv(path) {
                    Ok((intervals, skipped)) => {
                        let count = intervals.len();
                        for interval in intervals {
                            if let Err(e) = schedule.add_busy_interval(interval) {
                                println!("Skipped: {}", e);
                            }
                        }
                        println!("Imported {count} busy intervals ({skipped} skipped).");
                    }
                    Err(e) => println!("Error importing busy intervals: {}", e),
                },
                _ => println!("Usage: import <ops|busy> <csv_path>"),
            },
            "db" => match (parts.next(), parts.next(), parts.next()) {
                (Some("push"), Some(path), Some(plan)) => match db_push(&schedule, path, plan) {
                    Ok(count) => println!("Pushed {count} operations of plan {plan} to {path}."),
                    Err(e) => println!("Database error: {}", e),
                },
                (Some("regenerate"), Some(path), Some(plan)) => {
                    match db_regenerate(&schedule, path, plan) {
                        Ok((summary, entries)) => {
                            println!("Regenerated ({})\n{}", summary, render_schedule(&entries))
                        }
                        Err(e) => println!("Database error: {}", e),
                    }
                }
                (Some("show"), Some(path), Some(plan)) => {
                    let entries = SqliteScheduleStore::new(path)
                        .and_then(|store| store.scheduled_operations(plan));
                    match entries {
                        Ok(entries) => println!("{}", render_schedule(&entries)),
                        Err(e) => println!("Database error: {}", e),
                    }
                }
                _ => println!("Usage: db <push|regenerate|show> <sqlite_path> <plan>"),
            },
            _ => println!("Unknown command. Type 'help'."),
        }
    }
}
