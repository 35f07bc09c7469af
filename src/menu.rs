use std::io::{self, Write};

pub fn show_menu(mode: &str) {
    println!("\n===========================================");
    println!("Smart Motor Console ({mode} mode)");
    println!("===========================================");
    println!("Select an option:");
    println!("1. Show telemetry");
    println!("2. Position mode: move to target");
    println!("3. Position mode: set velocity / acceleration");
    println!("4. Velocity mode: set velocity");
    println!("5. Set origin here");
    println!("6. Go to origin");
    println!("7. Stop");
    println!("8. Balance on rangefinder (PID)");
    println!("9. Exit");
    println!("===========================================");
    print!("Choice (1-9): ");
    let _ = io::stdout().flush();
}

fn read_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

pub fn get_user_choice() -> Option<u32> {
    read_line().ok()?.trim().parse::<u32>().ok()
}

/// Ask for a number; an empty answer keeps `current`.
pub fn prompt_f32(label: &str, current: f32) -> f32 {
    loop {
        print!("{label} [{current:.2}]: ");
        let _ = io::stdout().flush();
        let Ok(input) = read_line() else {
            return current;
        };
        let input = input.trim();
        if input.is_empty() {
            return current;
        }
        match input.parse::<f32>() {
            Ok(v) if v.is_finite() => return v,
            _ => println!("Not a number: {input}"),
        }
    }
}

pub fn wait_for_enter() {
    println!("\nPress Enter to return to menu...");
    let _ = read_line();
}
