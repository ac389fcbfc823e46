//! # Módulo de Métricas y Reportes
//!
//! Este módulo calcula las estadísticas finales de una corrida a partir del
//! contexto terminado y genera los reportes de texto y CSV.
//!
//! El cálculo es una función pura: no modifica el contexto, por lo que
//! calcular dos veces sobre la misma corrida produce el mismo resultado.

use std::time::Duration;

use serde::Serialize;

use crate::context::SimulationContext;
use crate::dispatch::PolicyKind;

/// Estadísticas de una fila.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStatistics {
    /// Índice de la fila
    pub line: usize,
    /// Pasajeros que la política asignó a esta fila
    pub passengers_assigned: usize,
    /// Pasajeros sin tiempo de espera registrado al cerrar la corrida
    pub in_flight: usize,
    /// Tiempo promedio de espera en segundos
    pub average_wait_secs: f64,
    /// Tiempo máximo de espera en segundos
    pub max_wait_secs: f64,
    /// Mayor largo observado de la fila
    pub longest_length: usize,
}

/// Estadísticas de una estación de servicio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatistics {
    pub station: usize,
    pub passengers_served: usize,
    /// Tiempo de servicio efectivo en segundos
    pub busy_secs: f64,
    /// Porcentaje de la corrida que la estación estuvo ocupada, en [0, 100]
    pub utilization_pct: f64,
}

/// Resultado final de una corrida, listo para mostrar o serializar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub policy: PolicyKind,
    /// Duración total de la corrida en segundos virtuales
    pub total_elapsed_secs: f64,
    pub passengers_total: usize,
    pub passengers_served: usize,
    /// Espera promedio de todos los pasajeros despachados
    pub average_wait_secs: f64,
    /// Desviación acumulada de los servicios respecto al promedio
    pub cumulative_jitter_secs: f64,
    pub lines: Vec<LineStatistics>,
    pub stations: Vec<StationStatistics>,
}

/// Acumulador de esperas de un subconjunto de pasajeros.
#[derive(Debug, Default)]
struct WaitAccumulator {
    count: usize,
    in_flight: usize,
    total: Duration,
    max: Duration,
}

impl WaitAccumulator {
    fn add(&mut self, wait: Option<Duration>, fallback: Duration) {
        let wait = wait.unwrap_or_else(|| {
            self.in_flight += 1;
            fallback
        });
        self.count += 1;
        self.total += wait;
        self.max = self.max.max(wait);
    }

    fn average_secs(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() / self.count as f64
    }
}

/// Calculadora de métricas para la simulación.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Calcula las estadísticas de una corrida terminada.
    ///
    /// Los pasajeros que siguen en vuelo (sin tiempo de salida) se cuentan
    /// con el tiempo promedio de servicio como espera y se reportan en
    /// `in_flight`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Contexto de la corrida, ya en estado de solo lectura
    /// * `elapsed` - Duración total de la corrida en tiempo virtual
    /// * `policy` - Política con la que se ejecutó la corrida
    pub fn calculate(
        &self,
        ctx: &SimulationContext,
        elapsed: Duration,
        policy: PolicyKind,
    ) -> StatisticsSnapshot {
        let fallback = ctx.average_service();
        let mut per_line: Vec<WaitAccumulator> =
            (0..ctx.line_count()).map(|_| WaitAccumulator::default()).collect();
        let mut overall = WaitAccumulator::default();

        for passenger in ctx.passengers() {
            let record = passenger.record();
            let Some(line) = record.assigned_line else {
                continue;
            };
            let wait = record.wait_time();
            overall.add(wait, fallback);
            if let Some(acc) = per_line.get_mut(line) {
                acc.add(wait, fallback);
            }
        }

        let lines = per_line
            .iter()
            .enumerate()
            .map(|(line, acc)| LineStatistics {
                line,
                passengers_assigned: acc.count,
                in_flight: acc.in_flight,
                average_wait_secs: acc.average_secs(),
                max_wait_secs: acc.max.as_secs_f64(),
                longest_length: ctx.longest_length(line),
            })
            .collect();

        let stations = ctx
            .stations()
            .iter()
            .enumerate()
            .map(|(station, tally)| StationStatistics {
                station,
                passengers_served: tally.served(),
                busy_secs: tally.busy_time().as_secs_f64(),
                utilization_pct: Self::utilization(
                    tally.served(),
                    fallback,
                    tally.jitter_millis(),
                    elapsed,
                ),
            })
            .collect();

        StatisticsSnapshot {
            policy,
            total_elapsed_secs: elapsed.as_secs_f64(),
            passengers_total: ctx.passenger_count(),
            passengers_served: ctx.passengers_served(),
            average_wait_secs: overall.average_secs(),
            cumulative_jitter_secs: ctx.cumulative_jitter_millis() as f64 / 1000.0,
            lines,
            stations,
        }
    }

    /// Porcentaje de ocupación de una estación:
    /// `(atendidos × servicio promedio + jitter acumulado) / duración × 100`,
    /// acotado a `[0, 100]`.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use passenger_queue_simulator::MetricsCalculator;
    ///
    /// let average = Duration::from_secs(4);
    /// let pct = MetricsCalculator::utilization(5, average, -2_000, Duration::from_secs(36));
    /// assert!((pct - 50.0).abs() < 1e-9);
    /// ```
    pub fn utilization(
        served: usize,
        average_service: Duration,
        jitter_millis: i64,
        elapsed: Duration,
    ) -> f64 {
        let elapsed_secs = elapsed.as_secs_f64();
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        let busy_secs =
            served as f64 * average_service.as_secs_f64() + jitter_millis as f64 / 1000.0;
        (busy_secs / elapsed_secs * 100.0).clamp(0.0, 100.0)
    }

    /// Genera el reporte de texto de una corrida.
    pub fn generate_report(&self, snapshot: &StatisticsSnapshot) -> String {
        let mut report = String::new();

        report.push_str("\n============== Estadísticas de la simulación ==============\n");
        report.push_str(&format!("Política de despacho: {}\n", snapshot.policy));
        report.push_str(&format!(
            "Duración de la corrida: {}\n",
            Self::format_secs(snapshot.total_elapsed_secs)
        ));
        report.push_str(&format!(
            "Pasajeros atendidos: {}/{}\n",
            snapshot.passengers_served, snapshot.passengers_total
        ));
        report.push_str(&format!(
            "Espera promedio global: {}\n\n",
            Self::format_secs(snapshot.average_wait_secs)
        ));

        for line in &snapshot.lines {
            report.push_str(&format!("Fila {}:\n", line.line + 1));
            report.push_str(&format!("\tPasajeros asignados: {}\n", line.passengers_assigned));
            report.push_str(&format!(
                "\tEspera promedio: {}\n",
                Self::format_secs(line.average_wait_secs)
            ));
            report.push_str(&format!(
                "\tEspera máxima: {}\n",
                Self::format_secs(line.max_wait_secs)
            ));
            report.push_str(&format!("\tLargo máximo: {}\n", line.longest_length));
            if line.in_flight > 0 {
                report.push_str(&format!("\tEn vuelo al cerrar: {}\n", line.in_flight));
            }
        }

        report.push_str("\nOcupación de las estaciones:\n");
        for station in &snapshot.stations {
            report.push_str(&format!(
                "\tEstación {}: {:>3} atendidos, activa {:.1}% del tiempo\n",
                station.station + 1,
                station.passengers_served,
                station.utilization_pct
            ));
        }
        report.push_str("===========================================================\n");

        report
    }

    /// Genera un CSV con una fila por pasajero.
    pub fn generate_csv_report(&self, ctx: &SimulationContext) -> String {
        let mut csv = String::from(
            "PassengerID,ScheduledArrival,Arrival,Departure,Completed,Line,Station,Wait\n",
        );
        let secs = |value: Option<Duration>| {
            value
                .map(|d| format!("{:.3}", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string())
        };
        let index = |value: Option<usize>| {
            value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        };

        for passenger in ctx.passengers() {
            let record = passenger.record();
            csv.push_str(&format!(
                "{},{:.3},{},{},{},{},{},{}\n",
                passenger.id,
                passenger.scheduled_arrival.as_secs_f64(),
                secs(record.arrival_time),
                secs(record.departure_time),
                secs(record.service_completed_at),
                index(record.assigned_line),
                index(record.served_by),
                secs(record.wait_time()),
            ));
        }
        csv
    }

    /// Formatea segundos con dos decimales (ej: "12.50 s").
    pub fn format_secs(secs: f64) -> String {
        format!("{secs:.2} s")
    }
}
