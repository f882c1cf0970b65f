//! `--list`: print the catalogue

use super::dispatch::Context;

pub fn execute(context: &Context) {
    println!("Evaluations:");
    for name in context.evaluations.evaluation_names() {
        println!("  {}", name);
    }

    println!("Configurations (* = default):");
    let defaults = context.configurations.default_agents();
    for id in context.configurations.agent_names() {
        let marker = if defaults.contains(&id) { "*" } else { " " };
        println!("  {} {}", marker, id);
    }

    println!("Commands:");
    for name in context.configurations.command_names() {
        println!("  {}", name);
    }

    println!("Quick configuration: {}", context.settings.quick_configuration);
}
