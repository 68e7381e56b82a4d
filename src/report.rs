use std::fmt::Write;

use crate::summary::SweepSummary;

pub const MAX_REPORTED_ERRORS: usize = 10;

pub struct Report {
    pub subject: String,
    pub message: String,
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn render(summary: &SweepSummary) -> Report {
    let mode = if summary.dry_run { "DRY RUN" } else { "ACTIVE CLEANUP" };
    let mut message = String::new();

    // write! into a String cannot fail
    let _ = write!(
        message,
        "\nAWS Resource Cleanup Report\n============================\n\n\
         Timestamp: {}\nMode: {}\nRegion: {}\n\n\
         Resources Found:\n----------------",
        summary.timestamp.to_rfc3339(),
        mode,
        summary.region
    );
    for (kind, count) in summary.resources_found.iter().filter(|(_, count)| **count > 0) {
        let _ = write!(message, "\n{}: {}", title_case(kind.key()), count);
    }

    if !summary.dry_run {
        message.push_str("\n\nResources Deleted:\n------------------");
        for (kind, count) in summary.resources_deleted.iter().filter(|(_, count)| **count > 0) {
            let _ = write!(message, "\n{}: {}", title_case(kind.key()), count);
        }
    }

    let _ = write!(
        message,
        "\n\nEstimated Monthly Savings: ${:.2}\n\n",
        summary.savings_as_f64()
    );

    if !summary.errors.is_empty() {
        message.push_str("Errors:\n-------\n");
        for error in summary.errors.iter().take(MAX_REPORTED_ERRORS) {
            let _ = writeln!(message, "- {}", error);
        }
    }

    if summary.dry_run {
        message.push_str(
            "\nNote: This was a DRY RUN. No resources were actually deleted.\n\
             To perform actual cleanup, set DRY_RUN environment variable to 'false'.\n",
        );
    }

    let subject = format!(
        "AWS Cleanup Report - {}",
        if summary.dry_run { "DRY RUN" } else { "COMPLETED" }
    );
    Report { subject, message }
}
