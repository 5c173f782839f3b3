use crate::ui::{Icons, theme};
use crate::walkthrough::Step;
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::COOKIE, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

/// One walkthrough step: title, then its printed lines indented
pub fn step(index: usize, step: &Step) {
    println!();
    println!(
        "{} {} {}",
        Icons::STEP.style(theme().info.clone()),
        format!("{:>2}.", index).style(theme().muted.clone()),
        step.title.style(theme().header.clone())
    );
    for line in &step.lines {
        println!("   {}", line);
    }
}

pub fn sql(statement: &str) {
    println!("{}", statement.style(theme().sql.clone()));
}
