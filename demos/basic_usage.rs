//! Ejemplo básico: compara las cuatro políticas de despacho con la misma carga

use std::sync::Arc;
use std::time::Duration;

use passenger_queue_simulator::{
    PolicyKind, ScaledClock, Simulation, SimulationConfig, StatisticsSnapshot,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ejemplo: Comparación de Políticas ===\n");

    let mut results: Vec<StatisticsSnapshot> = Vec::new();

    for (i, policy) in PolicyKind::ALL.into_iter().enumerate() {
        println!("{}. Ejecutando simulación con {}...", i + 1, policy);

        // 10 minutos simulados, una llegada cada 7 s y 20 s de servicio;
        // 2 ms reales por segundo simulado
        let config = SimulationConfig::new(policy, 600, 7, 20)?.with_seed(2025);
        let clock = Arc::new(ScaledClock::new(Duration::from_millis(2)));
        let mut simulation = Simulation::with_clock(config, clock)?;
        let snapshot = simulation.run()?;

        println!("{}", simulation.generate_report(&snapshot));
        results.push(snapshot);
    }

    println!("\n=== Comparación de Políticas ===");
    println!("| Política       | Espera prom. | Espera máx. | Fila más larga |");
    println!("|----------------|--------------|-------------|----------------|");
    for snapshot in &results {
        let max_wait = snapshot.lines.iter().map(|l| l.max_wait_secs).fold(0.0, f64::max);
        let longest = snapshot.lines.iter().map(|l| l.longest_length).max().unwrap_or(0);
        println!(
            "| {:<14} | {:>10.2}s | {:>10.2}s | {:>14} |",
            snapshot.policy.name(),
            snapshot.average_wait_secs,
            max_wait,
            longest
        );
    }

    Ok(())
}
