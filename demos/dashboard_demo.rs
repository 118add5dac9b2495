use chrono::NaiveDate;
use fee_ledger_engine::*;
use rust_decimal::Decimal;

fn student(name: &str, roll: &str, class: &str, fields: &[(SessionMonth, &str)]) -> StudentRecord {
    StudentRecord {
        name: name.to_string(),
        roll_number: roll.to_string(),
        class: class.to_string(),
        registration_date: NaiveDate::from_ymd_opt(2024, 1, 8),
        previous_dues: Decimal::ZERO,
        months: fields
            .iter()
            .map(|(m, f)| (*m, Some(f.to_string())))
            .collect(),
    }
}

fn main() {
    println!("📒 Fee Ledger Demo\n");
    println!("Three encodings live side by side in the month fields:");
    println!("  - legacy ISO stamps (paid in full, amount implied by the class fee)");
    println!("  - 'Dues' declarations");
    println!("  - amount=d=date payment lists\n");

    let input = CohortInput {
        students: vec![
            student(
                "Asha",
                "1",
                "Grade 5",
                &[
                    (SessionMonth::January, "2024-01-09T10:12:00.000Z"),
                    (SessionMonth::February, "400=d=2024-02-10;400=d=2024-02-25"),
                    (SessionMonth::March, "800=d=2024-03-12"),
                ],
            ),
            student(
                "Bilal",
                "2",
                "Grade 5",
                &[
                    (SessionMonth::January, "800=d=2024-01-15"),
                    (SessionMonth::February, "Dues"),
                    (SessionMonth::March, "300=d=2024-03-12;oops"),
                ],
            ),
            student("Chitra", "1", "Grade 6", &[(SessionMonth::March, "950=d=2024-03-02")]),
        ],
        classes: vec![
            ClassRecord {
                name: "Grade 5".to_string(),
                school_fees: Decimal::from(800),
            },
            ClassRecord {
                name: "Grade 6".to_string(),
                school_fees: Decimal::from(950),
            },
        ],
        attendance: Some(vec![AttendanceRecord {
            class: "Grade 5".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
            present: "1,2".to_string(),
            absent: String::new(),
        }]),
        salaries: None,
        exams: None,
    };

    let as_of = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
    let engine = match FeeLedgerEngine::new(EngineConfig::default()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            return;
        }
    };

    for record in &input.students {
        let ledger = engine.student_ledger(record, &input.classes, as_of);
        println!("👤 {} ({})", ledger.name, ledger.class);
        for entry in ledger.entries.iter().take(4) {
            println!(
                "  {:<9} {:<8} paid {:>6} due {:>6} balance {:>6}",
                entry.month.name(),
                format!("{:?}", entry.status),
                entry.amount_paid,
                entry.amount_due,
                entry.balance_due
            );
        }
        println!();
    }

    match engine.report(&input, as_of) {
        Ok(report) => {
            println!("📊 KPIs as of {}:", as_of);
            println!("  Students:        {}", report.kpis.students);
            println!("  Paid (session):  {:>10.2}", report.kpis.total_paid);
            println!("  Dues (session):  {:>10.2}", report.kpis.total_dues);
            println!("  Collected today: {:>10.2}", report.kpis.collected_today);
            println!("  Attendance rate: {:>9.1}%", report.kpis.attendance_rate_today);

            println!("\n🏫 Class dues ranking:");
            for row in &report.class_dues {
                println!("  {:<10} {:>10.2}", row.label, row.value);
            }

            println!("\n🍩 Fee status this month:");
            for slice in &report.fee_status {
                println!("  {:<8} {:>3} ({:.2}%)", slice.label, slice.count, slice.percent);
            }
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
        }
    }
}
