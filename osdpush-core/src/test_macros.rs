macro_rules! event {
    ($id:expr, $start_time:expr, $duration:literal, $title:expr) => {{
        crate::models::EpgEvent::new(
            ($id as u32).into(),
            $start_time,
            chrono::Duration::from_std(humantime::parse_duration($duration).unwrap()).unwrap(),
            $title.to_string(),
        )
    }};
}

macro_rules! channel {
    ($number:expr, $id:expr, $name:expr) => {
        crate::models::Channel {
            number: ($number as u32).into(),
            id: $id.into(),
            name: $name.to_string(),
            provider: "".to_string(),
            stream_info: Default::default(),
        }
    };
}

macro_rules! timer {
    ($id:expr, $file:expr, $recording:expr, $origin:expr) => {
        crate::models::Timer {
            id: $id,
            channel: 1.into(),
            file: $file.to_string(),
            start_time: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            stop_time: chrono::DateTime::from_timestamp(3600, 0).unwrap(),
            recording: $recording,
            origin: $origin,
        }
    };
}
