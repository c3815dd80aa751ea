use chrono::Local;

pub enum LogServiceType {
    Register,
    Database,
    Scheduler,
    Recognition,
    Other
}
impl LogServiceType {
    fn as_str(&self) -> &'static str {
        match self {
            LogServiceType::Register => "REGISTER",
            LogServiceType::Database => "DATABASE",
            LogServiceType::Scheduler => "SCHEDULER",
            LogServiceType::Recognition => "RECOGNITION",
            LogServiceType::Other => "OTHER"
        }
    }
}

pub fn log_info(service: LogServiceType, message: String) {
    println!("{} - {} - {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), service.as_str(), message)
}

pub fn log_error(service: LogServiceType, message: String) {
    println!("{} - ERROR - {} - {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), service.as_str(), message)
}
