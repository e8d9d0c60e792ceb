use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use iced::alignment::Horizontal;
use iced::keyboard;
use iced::theme;
use iced::widget::{
    button, checkbox, column, container, pick_list, row, scrollable, text, text_input,
};
use iced::{Alignment, Application, Color, Command, Element, Length, Subscription, Theme};

use ecbalance_core::{
    distribution_cell, price_cell, targets, upload_fallback_path, ApiConfig, DistTariffMode,
    DistributionMethod, Error, LocalStore, MeteringObject, OutputsListing, PriceScope, PricingMode,
    PricingModeController, RunReport, ServiceClient, Step3Params, Step3Summary, StorageAction,
    VersionInfo, DEFAULT_MAX_RECIPIENTS, DEFAULT_PRICE_COMMODITY_MWH,
    DEFAULT_PRICE_DISTRIBUTION_MWH, DEFAULT_PRICE_FEED_IN_MWH, UPLOAD_KEY_CONSUMPTION,
    UPLOAD_KEY_GENERATION, UPLOAD_KEY_SELF_CONSUMPTION,
};

use crate::logging::{apply_log_level, LogBuffer, LogEntry, LogLevel, ReloadHandle};

const DEFAULT_STORE_FILE: &str = "ecbalance-settings.json";
const OUTPUTS_REFRESH_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Settings,
    Run,
    Outputs,
    Debug,
}

#[derive(Debug, Clone)]
pub enum Message {
    LogTick,
    LogLevelChanged(LogLevel),
    ToggleTarget(String, bool),
    CopyDiagnostics,
    SelectTab(Tab),
    ScopeModeSet(PriceScope, PricingMode),
    SharedPriceChanged(PriceScope, String),
    SelectObject(usize),
    NewObject,
    ApplyObject,
    DeleteSelectedObject,
    ObjectNameChanged(String),
    ObjectAnnualConsChanged(String),
    ObjectAnnualGenChanged(String),
    ObjectPriceCommodityChanged(String),
    ObjectDistModeChanged(DistTariffMode),
    ObjectPriceDistributionChanged(String),
    ObjectTariffChanged(String),
    ObjectPriceFeedInChanged(String),
    ObjectPvChanged(String),
    ObjectChpChanged(String),
    ObjectBatteryChanged(String),
    ObjectHotWaterChanged(String),
    ObjectSeriesConsToggled(bool),
    ObjectSeriesGenToggled(bool),
    ConsumptionCsvChanged(String),
    GenerationCsvChanged(String),
    SelfConsumptionCsvChanged(String),
    MethodChanged(DistributionMethod),
    MaxRecipientsChanged(String),
    StartRun,
    RunFinished {
        run_id: u64,
        result: Result<RunReport, ApiErrorInfo>,
    },
    RefreshOutputs,
    OutputsLoaded(Result<OutputsListing, ApiErrorInfo>),
    SummaryLoaded(Result<Step3Summary, ApiErrorInfo>),
    CopyDownloadLink(String),
    ExportDirChanged(String),
    SaveOutput(String),
    OutputSaved(Result<String, ApiErrorInfo>),
    CheckService,
    ServiceChecked(Result<VersionInfo, ApiErrorInfo>),
}

#[derive(Debug, Clone)]
pub struct ApiErrorInfo {
    summary: String,
    detail: String,
}

pub struct Flags {
    pub log_buffer: LogBuffer,
    pub reload_handle: ReloadHandle,
    pub api_base: Option<String>,
}

pub struct EcBalanceApp {
    log_buffer: LogBuffer,
    reload_handle: ReloadHandle,
    log_entries: Vec<LogEntry>,
    log_level: LogLevel,
    known_targets: HashSet<String>,
    enabled_targets: HashSet<String>,
    copy_status: Option<String>,
    active_tab: Tab,
    store: LocalStore,
    controller: PricingModeController,
    client: Option<ServiceClient>,
    service_version: Option<VersionInfo>,
    service_status: Option<String>,
    shared_commodity_text: String,
    shared_distribution_text: String,
    shared_feedin_text: String,
    objects: Vec<MeteringObject>,
    selected_object: Option<usize>,
    object_name: String,
    object_annual_cons: String,
    object_annual_gen: String,
    object_price_commodity: String,
    object_dist_mode: DistTariffMode,
    object_price_distribution: String,
    object_tariff: String,
    object_price_feedin: String,
    object_pv: String,
    object_chp: String,
    object_battery: String,
    object_hot_water: String,
    object_series_cons: bool,
    object_series_gen: bool,
    object_status: Option<String>,
    consumption_csv: String,
    generation_csv: String,
    selfcons_csv: String,
    method: DistributionMethod,
    max_recipients_text: String,
    run_in_flight: bool,
    run_id: u64,
    run_status: Option<String>,
    run_report: Option<RunReport>,
    run_finished_at: Option<u64>,
    outputs: Option<OutputsListing>,
    outputs_status: Option<String>,
    outputs_in_flight: bool,
    outputs_refreshed_at: Option<u64>,
    summary: Option<Step3Summary>,
    summary_in_flight: bool,
    export_dir: String,
    export_status: Option<String>,
    last_api_error: Option<String>,
}

impl Application for EcBalanceApp {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let known_targets: HashSet<String> =
            targets::ALL.iter().map(|value| value.to_string()).collect();
        let enabled_targets = known_targets.clone();

        let mut store = LocalStore::open(DEFAULT_STORE_FILE);
        let controller = PricingModeController::initialize(&mut store);
        let objects = seed_objects();

        let config = match flags.api_base.as_deref() {
            Some(base) => ApiConfig::with_base_url(base),
            None => ApiConfig::default(),
        };
        let client = match ServiceClient::new(config) {
            Ok(client) => Some(client),
            Err(error) => {
                tracing::warn!(
                    target: targets::API,
                    "HTTP client init failed: {}",
                    error.technical_detail()
                );
                None
            }
        };

        let mut app = Self {
            log_buffer: flags.log_buffer,
            reload_handle: flags.reload_handle,
            log_entries: Vec::new(),
            log_level: LogLevel::default(),
            known_targets,
            enabled_targets,
            copy_status: None,
            active_tab: Tab::Settings,
            store,
            controller,
            client,
            service_version: None,
            service_status: None,
            shared_commodity_text: String::new(),
            shared_distribution_text: String::new(),
            shared_feedin_text: String::new(),
            objects,
            selected_object: None,
            object_name: String::new(),
            object_annual_cons: String::new(),
            object_annual_gen: String::new(),
            object_price_commodity: String::new(),
            object_dist_mode: DistTariffMode::UnitPrice,
            object_price_distribution: String::new(),
            object_tariff: String::new(),
            object_price_feedin: String::new(),
            object_pv: String::new(),
            object_chp: String::new(),
            object_battery: String::new(),
            object_hot_water: String::new(),
            object_series_cons: false,
            object_series_gen: false,
            object_status: None,
            consumption_csv: String::new(),
            generation_csv: String::new(),
            selfcons_csv: String::new(),
            method: DistributionMethod::Hybrid,
            max_recipients_text: DEFAULT_MAX_RECIPIENTS.to_string(),
            run_in_flight: false,
            run_id: 0,
            run_status: None,
            run_report: None,
            run_finished_at: None,
            outputs: None,
            outputs_status: None,
            outputs_in_flight: false,
            outputs_refreshed_at: None,
            summary: None,
            summary_in_flight: false,
            export_dir: String::new(),
            export_status: None,
            last_api_error: None,
        };

        if app.client.is_none() {
            app.service_status = Some("HTTP client unavailable.".to_string());
        }
        let command = app.check_service();

        (app, command)
    }

    fn title(&self) -> String {
        "EC Balance".to_string()
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::LogTick => {
                self.refresh_logs();
                Command::none()
            }
            Message::LogLevelChanged(level) => {
                self.log_level = level;
                apply_log_level(&self.reload_handle, level);
                tracing::info!(target: targets::UI, "Log level set to {}", level);
                Command::none()
            }
            Message::ToggleTarget(target, enabled) => {
                if enabled {
                    self.enabled_targets.insert(target);
                } else {
                    self.enabled_targets.remove(&target);
                }
                Command::none()
            }
            Message::CopyDiagnostics => {
                self.copy_status = Some(self.copy_diagnostics());
                Command::none()
            }
            Message::SelectTab(tab) => {
                self.active_tab = tab;
                if tab == Tab::Outputs {
                    Command::batch(vec![self.fetch_outputs(), self.fetch_summary()])
                } else {
                    Command::none()
                }
            }
            Message::ScopeModeSet(scope, mode) => {
                self.controller.set_mode(&mut self.store, scope, mode);
                if mode == PricingMode::Uniform {
                    self.propagate_shared(scope);
                }
                Command::none()
            }
            Message::SharedPriceChanged(scope, value) => {
                self.set_shared_text(scope, value);
                self.propagate_shared(scope);
                Command::none()
            }
            Message::SelectObject(index) => {
                self.select_object(index);
                Command::none()
            }
            Message::NewObject => {
                self.selected_object = None;
                self.clear_object_form();
                Command::none()
            }
            Message::ApplyObject => {
                self.apply_object_form();
                Command::none()
            }
            Message::DeleteSelectedObject => {
                self.delete_selected_object();
                Command::none()
            }
            Message::ObjectNameChanged(value) => {
                self.object_name = value;
                Command::none()
            }
            Message::ObjectAnnualConsChanged(value) => {
                self.object_annual_cons = value;
                Command::none()
            }
            Message::ObjectAnnualGenChanged(value) => {
                self.object_annual_gen = value;
                Command::none()
            }
            Message::ObjectPriceCommodityChanged(value) => {
                self.object_price_commodity = value;
                Command::none()
            }
            Message::ObjectDistModeChanged(mode) => {
                self.object_dist_mode = mode;
                Command::none()
            }
            Message::ObjectPriceDistributionChanged(value) => {
                self.object_price_distribution = value;
                Command::none()
            }
            Message::ObjectTariffChanged(value) => {
                self.object_tariff = value;
                Command::none()
            }
            Message::ObjectPriceFeedInChanged(value) => {
                self.object_price_feedin = value;
                Command::none()
            }
            Message::ObjectPvChanged(value) => {
                self.object_pv = value;
                Command::none()
            }
            Message::ObjectChpChanged(value) => {
                self.object_chp = value;
                Command::none()
            }
            Message::ObjectBatteryChanged(value) => {
                self.object_battery = value;
                Command::none()
            }
            Message::ObjectHotWaterChanged(value) => {
                self.object_hot_water = value;
                Command::none()
            }
            Message::ObjectSeriesConsToggled(value) => {
                self.object_series_cons = value;
                Command::none()
            }
            Message::ObjectSeriesGenToggled(value) => {
                self.object_series_gen = value;
                Command::none()
            }
            Message::ConsumptionCsvChanged(value) => {
                self.consumption_csv = value;
                Command::none()
            }
            Message::GenerationCsvChanged(value) => {
                self.generation_csv = value;
                Command::none()
            }
            Message::SelfConsumptionCsvChanged(value) => {
                self.selfcons_csv = value;
                Command::none()
            }
            Message::MethodChanged(method) => {
                self.method = method;
                Command::none()
            }
            Message::MaxRecipientsChanged(value) => {
                self.max_recipients_text = value;
                Command::none()
            }
            Message::StartRun => self.start_run(),
            Message::RunFinished { run_id, result } => self.handle_run_finished(run_id, result),
            Message::RefreshOutputs => {
                if self.active_tab == Tab::Outputs {
                    Command::batch(vec![self.fetch_outputs(), self.fetch_summary()])
                } else {
                    Command::none()
                }
            }
            Message::OutputsLoaded(result) => {
                self.outputs_in_flight = false;
                match result {
                    Ok(listing) => {
                        self.outputs_refreshed_at = Some(now_epoch_seconds());
                        self.outputs_status = Some(format!(
                            "{} CSV files in {}.",
                            listing.csv.len(),
                            listing.root
                        ));
                        self.outputs = Some(listing);
                    }
                    Err(error) => {
                        self.outputs_status = Some(format!("Refresh failed: {}", error.summary));
                        self.last_api_error = Some(error.detail);
                    }
                }
                Command::none()
            }
            Message::SummaryLoaded(result) => {
                self.summary_in_flight = false;
                match result {
                    Ok(summary) => {
                        self.summary = Some(summary);
                    }
                    Err(error) => {
                        self.last_api_error = Some(error.detail);
                    }
                }
                Command::none()
            }
            Message::CopyDownloadLink(name) => {
                self.copy_download_link(&name);
                Command::none()
            }
            Message::ExportDirChanged(value) => {
                self.export_dir = value;
                Command::none()
            }
            Message::SaveOutput(name) => self.save_output(name),
            Message::OutputSaved(result) => {
                match result {
                    Ok(path) => {
                        self.export_status = Some(format!("Saved {path}."));
                        tracing::info!(target: targets::STORAGE, "Output saved to {}", path);
                    }
                    Err(error) => {
                        self.export_status = Some(format!("Save failed: {}", error.summary));
                        self.last_api_error = Some(error.detail);
                    }
                }
                Command::none()
            }
            Message::CheckService => self.check_service(),
            Message::ServiceChecked(result) => {
                match result {
                    Ok(version) => {
                        self.service_status = None;
                        tracing::info!(
                            target: targets::API,
                            "Connected to {} (ec_balance {})",
                            version.service,
                            version.ec_balance
                        );
                        self.service_version = Some(version);
                    }
                    Err(error) => {
                        self.service_version = None;
                        self.service_status =
                            Some(format!("Service unreachable: {}", error.summary));
                        self.last_api_error = Some(error.detail.clone());
                        tracing::warn!(
                            target: targets::API,
                            "Service check failed: {}",
                            error.detail
                        );
                    }
                }
                Command::none()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let log_tick = iced::time::every(Duration::from_millis(250)).map(|_| Message::LogTick);
        let outputs_tick = iced::time::every(Duration::from_secs(OUTPUTS_REFRESH_SECS))
            .map(|_| Message::RefreshOutputs);
        let delete_key = keyboard::on_key_press(delete_key_event);
        Subscription::batch(vec![log_tick, outputs_tick, delete_key])
    }

    fn view(&self) -> Element<'_, Message> {
        let header = row![
            text("EC Balance")
                .size(28)
                .style(theme::Text::Color(Color::from_rgb8(0x10, 0x1a, 0x24))),
            text("community billing settings")
                .size(16)
                .style(theme::Text::Color(Color::from_rgb8(0x5f, 0x6b, 0x7a))),
        ]
        .spacing(12)
        .align_items(Alignment::Center);

        let tabs = self.tab_bar();

        let body = match self.active_tab {
            Tab::Settings => self.settings_tab_view(),
            Tab::Run => self.run_tab_view(),
            Tab::Outputs => self.outputs_tab_view(),
            Tab::Debug => self.debug_tab_view(),
        };

        let footer = self.footer_view();

        let content = column![header, tabs, body, footer].spacing(20).padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }
}

impl EcBalanceApp {
    fn refresh_logs(&mut self) {
        let entries = self.log_buffer.snapshot();
        for entry in &entries {
            if self.known_targets.insert(entry.target.clone()) {
                self.enabled_targets.insert(entry.target.clone());
            }
        }
        self.log_entries = entries;
    }

    fn tab_bar(&self) -> Element<'_, Message> {
        row![
            self.tab_button(Tab::Settings, "Settings"),
            self.tab_button(Tab::Run, "Run"),
            self.tab_button(Tab::Outputs, "Outputs"),
            self.tab_button(Tab::Debug, "Debug")
        ]
        .spacing(8)
        .align_items(Alignment::Center)
        .into()
    }

    fn tab_button(&self, tab: Tab, label: &str) -> Element<'_, Message> {
        let style = if self.active_tab == tab {
            theme::Button::Primary
        } else {
            theme::Button::Secondary
        };

        button(text(label))
            .style(style)
            .on_press(Message::SelectTab(tab))
            .into()
    }

    fn footer_view(&self) -> Element<'_, Message> {
        let service_line = match (&self.service_version, &self.service_status) {
            (Some(version), _) => format!(
                "Service {} | ec_balance {}",
                version.service, version.ec_balance
            ),
            (None, Some(status)) => status.clone(),
            (None, None) => "Service not checked yet.".to_string(),
        };

        row![
            text(service_line)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a)))
                .width(Length::Fill),
            button(text("Recheck service").size(12)).on_press(Message::CheckService),
        ]
        .spacing(8)
        .align_items(Alignment::Center)
        .into()
    }

    fn settings_tab_view(&self) -> Element<'_, Message> {
        let pricing = self.pricing_panel_view();
        let objects = column![self.object_list_view(), self.object_editor_view()]
            .spacing(16)
            .width(Length::FillPortion(2));

        row![pricing, objects]
            .spacing(16)
            .align_items(Alignment::Start)
            .into()
    }

    fn pricing_panel_view(&self) -> Element<'_, Message> {
        let content = column![
            text("Pricing modes")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            text("Choose how each price is entered.")
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            self.scope_controls_view(PriceScope::Commodity),
            self.scope_controls_view(PriceScope::Distribution),
            self.scope_controls_view(PriceScope::FeedIn),
        ]
        .spacing(12);

        container(content)
            .padding(12)
            .width(Length::FillPortion(1))
            .style(theme::Container::Box)
            .into()
    }

    fn scope_controls_view(&self, scope: PriceScope) -> Element<'_, Message> {
        let visibility = self.controller.visibility(scope);

        let mut shared_input = text_input(shared_placeholder(scope), self.shared_text(scope))
            .padding(6)
            .size(12)
            .width(Length::Fill);
        if visibility.shared_input_enabled {
            shared_input =
                shared_input.on_input(move |value| Message::SharedPriceChanged(scope, value));
        }

        let caption = if visibility.shared_input_enabled {
            "Shared price, applied to every object."
        } else {
            "Prices are entered per object."
        };

        let content = column![
            text(scope.label())
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
            self.mode_toggle(scope),
            column![
                text("Price (CZK/MWh)")
                    .size(12)
                    .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
                shared_input,
            ]
            .spacing(4),
            text(caption)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
        ]
        .spacing(6);

        container(content)
            .padding(8)
            .style(theme::Container::Box)
            .into()
    }

    fn mode_toggle(&self, scope: PriceScope) -> Element<'_, Message> {
        let mode = self.controller.mode(scope);
        let uniform_style = if mode == PricingMode::Uniform {
            theme::Button::Primary
        } else {
            theme::Button::Secondary
        };
        let per_object_style = if mode == PricingMode::PerObject {
            theme::Button::Primary
        } else {
            theme::Button::Secondary
        };

        row![
            button(text(PricingMode::Uniform.label()).size(12))
                .style(uniform_style)
                .on_press(Message::ScopeModeSet(scope, PricingMode::Uniform)),
            button(text(PricingMode::PerObject.label()).size(12))
                .style(per_object_style)
                .on_press(Message::ScopeModeSet(scope, PricingMode::PerObject)),
        ]
        .spacing(4)
        .into()
    }

    fn object_list_view(&self) -> Element<'_, Message> {
        let mut list_items = column![].spacing(6);

        if self.objects.is_empty() {
            list_items = list_items.push(
                text("No metering objects yet.")
                    .size(14)
                    .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            );
        } else {
            for (index, object) in self.objects.iter().enumerate() {
                list_items = list_items.push(self.object_row(index, object));
            }
        }

        let content = column![
            text("Metering objects")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            text("Select an object to edit it. Delete removes the selection.")
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            row![button("New object").on_press(Message::NewObject)].spacing(8),
            list_items,
        ]
        .spacing(12);

        let scroll = scrollable(content).height(Length::Fill).width(Length::Fill);

        container(scroll)
            .padding(12)
            .height(Length::Fill)
            .style(theme::Container::Box)
            .into()
    }

    fn object_row(&self, index: usize, object: &MeteringObject) -> Element<'_, Message> {
        let is_selected = self.selected_object == Some(index);
        let commodity = cell_or_dash(price_cell(
            self.controller.mode(PriceScope::Commodity),
            object.price_commodity,
        ));
        let distribution = cell_or_dash(distribution_cell(
            object,
            self.controller.mode(PriceScope::Distribution),
        ));
        let feedin = cell_or_dash(price_cell(
            self.controller.mode(PriceScope::FeedIn),
            object.price_feed_in,
        ));

        let content = column![
            text(&object.name)
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x1f, 0x2a, 0x37))),
            text(format!(
                "Commodity {commodity} | Distribution {distribution} | Feed-in {feedin}"
            ))
            .size(12)
            .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
        ]
        .spacing(2);

        let style = if is_selected {
            theme::Button::Primary
        } else {
            theme::Button::Secondary
        };

        button(content)
            .style(style)
            .width(Length::Fill)
            .on_press(Message::SelectObject(index))
            .into()
    }

    fn object_editor_view(&self) -> Element<'_, Message> {
        let commodity_visibility = self.controller.visibility(PriceScope::Commodity);
        let distribution_visibility = self.controller.visibility(PriceScope::Distribution);
        let feedin_visibility = self.controller.visibility(PriceScope::FeedIn);

        let title = match self.selected_object {
            Some(_) => "Edit object",
            None => "New object",
        };

        let distribution_field: Element<'_, Message> =
            if distribution_visibility.per_object_inputs_enabled {
                let branch = match self.object_dist_mode {
                    DistTariffMode::UnitPrice => self.labeled_input(
                        "Distribution price (CZK/MWh)",
                        "1800",
                        &self.object_price_distribution,
                        true,
                        Message::ObjectPriceDistributionChanged,
                    ),
                    DistTariffMode::Tariff => self.labeled_input(
                        "Tariff",
                        "D57d",
                        &self.object_tariff,
                        true,
                        Message::ObjectTariffChanged,
                    ),
                };
                column![
                    text("Distribution entry")
                        .size(12)
                        .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
                    pick_list(
                        &DistTariffMode::ALL[..],
                        Some(self.object_dist_mode),
                        Message::ObjectDistModeChanged,
                    ),
                    branch,
                ]
                .spacing(4)
                .into()
            } else {
                self.labeled_input(
                    "Distribution price (CZK/MWh)",
                    "1800",
                    &self.object_price_distribution,
                    false,
                    Message::ObjectPriceDistributionChanged,
                )
            };

        let mut actions = row![button("Save object").on_press(Message::ApplyObject)].spacing(8);
        if self.selected_object.is_some() {
            actions = actions.push(button("Delete").on_press(Message::DeleteSelectedObject));
        }

        let status = self.object_status.as_deref().unwrap_or("Ready.");

        let content = column![
            text(title)
                .size(16)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            self.labeled_input(
                "Name",
                "Bytovka A",
                &self.object_name,
                true,
                Message::ObjectNameChanged
            ),
            row![
                self.labeled_input(
                    "Annual consumption (kWh)",
                    "12000",
                    &self.object_annual_cons,
                    true,
                    Message::ObjectAnnualConsChanged
                ),
                self.labeled_input(
                    "Annual generation (kWh)",
                    "0",
                    &self.object_annual_gen,
                    true,
                    Message::ObjectAnnualGenChanged
                ),
            ]
            .spacing(8),
            self.labeled_input(
                "Commodity price (CZK/MWh)",
                "2200",
                &self.object_price_commodity,
                commodity_visibility.per_object_inputs_enabled,
                Message::ObjectPriceCommodityChanged
            ),
            distribution_field,
            self.labeled_input(
                "Feed-in price (CZK/MWh)",
                "1200",
                &self.object_price_feedin,
                feedin_visibility.per_object_inputs_enabled,
                Message::ObjectPriceFeedInChanged
            ),
            row![
                self.labeled_input(
                    "PV (kWp)",
                    "0",
                    &self.object_pv,
                    true,
                    Message::ObjectPvChanged
                ),
                self.labeled_input(
                    "CHP (kWe)",
                    "0",
                    &self.object_chp,
                    true,
                    Message::ObjectChpChanged
                ),
            ]
            .spacing(8),
            row![
                self.labeled_input(
                    "Battery (kWh)",
                    "0",
                    &self.object_battery,
                    true,
                    Message::ObjectBatteryChanged
                ),
                self.labeled_input(
                    "Hot water (m3)",
                    "0",
                    &self.object_hot_water,
                    true,
                    Message::ObjectHotWaterChanged
                ),
            ]
            .spacing(8),
            checkbox("Has consumption series", self.object_series_cons)
                .on_toggle(Message::ObjectSeriesConsToggled),
            checkbox("Has generation series", self.object_series_gen)
                .on_toggle(Message::ObjectSeriesGenToggled),
            actions,
            text(status)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
        ]
        .spacing(8);

        container(content)
            .padding(12)
            .style(theme::Container::Box)
            .into()
    }

    fn labeled_input(
        &self,
        label: &str,
        placeholder: &str,
        value: &str,
        enabled: bool,
        message: fn(String) -> Message,
    ) -> Element<'_, Message> {
        let mut input = text_input(placeholder, value)
            .padding(6)
            .size(12)
            .width(Length::Fill);
        if enabled {
            input = input.on_input(message);
        }

        column![
            text(label)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
            input,
        ]
        .spacing(4)
        .into()
    }

    fn run_tab_view(&self) -> Element<'_, Message> {
        let action_button = if self.run_in_flight {
            button("Running")
        } else {
            button("Run step 3").on_press(Message::StartRun)
        };

        let status = self.run_status.as_deref().unwrap_or("Idle - ready to run.");

        let inputs = column![
            text("Run step 3")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            text("Uploads the three input files, then starts the distribution step.")
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            self.labeled_input(
                "Consumption after PV (CSV path)",
                "data/eano_after_pv.csv",
                &self.consumption_csv,
                true,
                Message::ConsumptionCsvChanged
            ),
            self.labeled_input(
                "Generation after PV (CSV path)",
                "data/eand_after_pv.csv",
                &self.generation_csv,
                true,
                Message::GenerationCsvChanged
            ),
            self.labeled_input(
                "Local self-consumption (CSV path)",
                "data/local_selfcons.csv",
                &self.selfcons_csv,
                true,
                Message::SelfConsumptionCsvChanged
            ),
            column![
                text("Distribution method")
                    .size(12)
                    .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
                pick_list(
                    &DistributionMethod::ALL[..],
                    Some(self.method),
                    Message::MethodChanged
                ),
            ]
            .spacing(4),
            self.labeled_input(
                "Max recipients",
                "3",
                &self.max_recipients_text,
                true,
                Message::MaxRecipientsChanged
            ),
            row![action_button].spacing(8),
            text(status)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
        ]
        .spacing(8);

        let inputs_panel = container(inputs)
            .padding(12)
            .width(Length::FillPortion(1))
            .style(theme::Container::Box);

        let report_panel = container(self.run_report_view())
            .padding(12)
            .width(Length::FillPortion(2))
            .height(Length::Fill)
            .style(theme::Container::Box);

        row![inputs_panel, report_panel]
            .spacing(16)
            .align_items(Alignment::Start)
            .into()
    }

    fn run_report_view(&self) -> Element<'_, Message> {
        let mut content = column![text("Run report")
            .size(20)
            .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12)))]
        .spacing(6);

        let Some(report) = &self.run_report else {
            content = content.push(
                text("No run yet.")
                    .size(14)
                    .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            );
            return content.into();
        };

        let outcome_color = if report.ok {
            Color::from_rgb8(0x22, 0x7d, 0x64)
        } else {
            Color::from_rgb8(0xe0, 0x4f, 0x4f)
        };
        let outcome = if report.ok { "OK" } else { "FAILED" };
        let return_code = report
            .return_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());

        content = content.push(
            text(format!("Result: {outcome} | return code {return_code}"))
                .size(14)
                .style(theme::Text::Color(outcome_color)),
        );

        if let Some(finished_at) = self.run_finished_at {
            content = content.push(
                text(format!("Finished at {finished_at}"))
                    .size(12)
                    .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            );
        }
        if let Some(error) = &report.error {
            content = content.push(
                text(error)
                    .size(12)
                    .style(theme::Text::Color(Color::from_rgb8(0xe0, 0x4f, 0x4f))),
            );
        }
        if !report.new_csv.is_empty() {
            content = content.push(
                text(format!("New CSV: {}", report.new_csv.join(", ")))
                    .size(12)
                    .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            );
        }
        if !report.log.is_empty() {
            let log_lines = text(&report.log)
                .size(12)
                .horizontal_alignment(Horizontal::Left)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a)));
            content = content.push(
                scrollable(log_lines)
                    .height(Length::Fill)
                    .width(Length::Fill),
            );
        }

        content.into()
    }

    fn outputs_tab_view(&self) -> Element<'_, Message> {
        let mut rows = column![].spacing(6);
        match &self.outputs {
            Some(listing) if !listing.csv.is_empty() => {
                for name in &listing.csv {
                    rows = rows.push(self.output_row(name));
                }
            }
            Some(_) => {
                rows = rows.push(
                    text("No CSV outputs yet.")
                        .size(14)
                        .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
                );
            }
            None => {
                rows = rows.push(
                    text("Outputs not loaded yet.")
                        .size(14)
                        .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
                );
            }
        }

        let root_line = match &self.outputs {
            Some(listing) => format!("Directory: {}", listing.root),
            None => "Directory: -".to_string(),
        };
        let refreshed = match self.outputs_refreshed_at {
            Some(at) => format!("Refreshed at {at}"),
            None => "Not refreshed yet.".to_string(),
        };
        let outputs_status = self.outputs_status.as_deref().unwrap_or("Ready.");
        let export_status = self.export_status.as_deref().unwrap_or("Ready.");

        let content = column![
            text("Outputs")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            text(root_line)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            self.labeled_input(
                "Save directory",
                ".",
                &self.export_dir,
                true,
                Message::ExportDirChanged
            ),
            row![button("Refresh").on_press(Message::RefreshOutputs)].spacing(8),
            text(outputs_status)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            text(refreshed)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            text(export_status)
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
            rows,
        ]
        .spacing(12);

        let scroll = scrollable(content).height(Length::Fill).width(Length::Fill);

        let listing_panel = container(scroll)
            .padding(12)
            .width(Length::FillPortion(2))
            .height(Length::Fill)
            .style(theme::Container::Box);

        row![listing_panel, self.summary_panel_view()]
            .spacing(16)
            .align_items(Alignment::Start)
            .into()
    }

    fn output_row(&self, name: &str) -> Element<'_, Message> {
        row![
            text(name)
                .size(13)
                .style(theme::Text::Color(Color::from_rgb8(0x1f, 0x2a, 0x37)))
                .width(Length::Fill),
            button(text("Copy link").size(12))
                .on_press(Message::CopyDownloadLink(name.to_string())),
            button(text("Save").size(12)).on_press(Message::SaveOutput(name.to_string())),
        ]
        .spacing(8)
        .align_items(Alignment::Center)
        .into()
    }

    fn summary_panel_view(&self) -> Element<'_, Message> {
        let body: Element<'_, Message> = match &self.summary {
            Some(summary) if summary.ok => {
                let mut lines = column![
                    text(format!("Rows: {}", summary.rows))
                        .size(13)
                        .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
                    text(format!(
                        "Import {:.1} kWh | Export {:.1} kWh",
                        summary.sum_import_kwh, summary.sum_export_kwh
                    ))
                    .size(13)
                    .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a))),
                ]
                .spacing(4);
                if let Some(note) = &summary.note {
                    lines = lines.push(
                        text(note)
                            .size(12)
                            .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
                    );
                }
                lines.into()
            }
            Some(summary) => {
                let message = summary.error.as_deref().unwrap_or("Summary unavailable.");
                text(message)
                    .size(13)
                    .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a)))
                    .into()
            }
            None => text("Run step 3 to produce a summary.")
                .size(13)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a)))
                .into(),
        };

        let panel = column![
            text("Step 3 summary")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            body,
        ]
        .spacing(10);

        container(panel)
            .padding(12)
            .width(Length::FillPortion(1))
            .style(theme::Container::Box)
            .into()
    }

    fn debug_tab_view(&self) -> Element<'_, Message> {
        let level_picker = pick_list(
            &LogLevel::ALL[..],
            Some(self.log_level),
            Message::LogLevelChanged,
        )
        .placeholder("Log level");

        let console_header = row![
            text("Console")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            level_picker
        ]
        .spacing(12)
        .align_items(Alignment::Center);

        let log_lines = self.log_lines_view();
        let filters = self.target_filters_view();

        let console = column![console_header, filters, log_lines]
            .spacing(12)
            .width(Length::FillPortion(2));

        let debug_panel = self.debug_panel_view();

        row![console, debug_panel]
            .spacing(16)
            .align_items(Alignment::Start)
            .into()
    }

    fn target_filters_view(&self) -> Element<'_, Message> {
        let mut filter_column = column![
            text("Targets")
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x3a, 0x4a, 0x5a)))
        ]
        .spacing(6);

        for target in self.sorted_targets() {
            let enabled = self.enabled_targets.contains(&target);
            filter_column = filter_column.push(
                checkbox(target.clone(), enabled)
                    .on_toggle(move |value| Message::ToggleTarget(target.clone(), value)),
            );
        }

        container(filter_column)
            .padding(8)
            .style(theme::Container::Box)
            .into()
    }

    fn log_lines_view(&self) -> Element<'_, Message> {
        let mut lines = column![].spacing(4);

        for entry in self.visible_entries() {
            let color = level_color(entry.level);
            let line = text(entry.format_line())
                .size(14)
                .horizontal_alignment(Horizontal::Left)
                .style(theme::Text::Color(color));
            lines = lines.push(line);
        }

        scrollable(lines)
            .height(Length::Fill)
            .width(Length::Fill)
            .into()
    }

    fn debug_panel_view(&self) -> Element<'_, Message> {
        let copy_status = self.copy_status.as_deref().unwrap_or("Ready");
        let store_path = self
            .store
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string());
        let api_base = self
            .client
            .as_ref()
            .map(|client| client.base_url().to_string())
            .unwrap_or_else(|| "unavailable".to_string());
        let toggles_json = serde_json::to_string(&self.controller.state())
            .unwrap_or_else(|_| "unavailable".to_string());
        let last_error = self.last_api_error.as_deref().unwrap_or("none");

        let panel = column![
            text("Debug panel")
                .size(20)
                .style(theme::Text::Color(Color::from_rgb8(0x12, 0x12, 0x12))),
            text(format!("Settings file: {store_path}"))
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            text(format!("Service base: {api_base}"))
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            text(format!("Toggles: {toggles_json}"))
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            text(format!("Objects: {}", self.objects.len()))
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            text(format!("Last service error: {last_error}"))
                .size(14)
                .style(theme::Text::Color(Color::from_rgb8(0x4a, 0x4a, 0x4a))),
            button("Copy diagnostics").on_press(Message::CopyDiagnostics),
            text(format!("Clipboard: {copy_status}"))
                .size(12)
                .style(theme::Text::Color(Color::from_rgb8(0x6a, 0x6a, 0x6a))),
        ]
        .spacing(10);

        container(panel)
            .padding(12)
            .width(Length::FillPortion(1))
            .style(theme::Container::Box)
            .into()
    }

    fn sorted_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.known_targets.iter().cloned().collect();
        targets.sort();
        targets
    }

    fn visible_entries(&self) -> Vec<&LogEntry> {
        self.log_entries
            .iter()
            .filter(|entry| self.enabled_targets.contains(&entry.target))
            .collect()
    }

    fn copy_diagnostics(&self) -> String {
        let text = self.diagnostics_text();
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
            Ok(()) => {
                tracing::info!(target: targets::UI, "Diagnostics copied to clipboard");
                "Copied".to_string()
            }
            Err(error) => {
                tracing::warn!(target: targets::UI, "Clipboard copy failed: {}", error);
                format!("Failed: {error}")
            }
        }
    }

    fn diagnostics_text(&self) -> String {
        let mut output = String::new();
        output.push_str("EC Balance diagnostics\n");
        output.push_str(&format!("Log level: {}\n", self.log_level));
        if let Some(path) = self.store.path() {
            output.push_str(&format!("Settings file: {}\n", path.display()));
        }
        if let Some(client) = &self.client {
            output.push_str(&format!("Service base: {}\n", client.base_url()));
        }
        if let Ok(toggles) = serde_json::to_string(&self.controller.state()) {
            output.push_str(&format!("Toggles: {toggles}\n"));
        }
        output.push_str(&format!("Objects: {}\n", self.objects.len()));
        if let Some(version) = &self.service_version {
            output.push_str(&format!(
                "Service version: {} (ec_balance {})\n",
                version.service, version.ec_balance
            ));
        }
        if let Some(error) = &self.last_api_error {
            output.push_str(&format!("Last service error: {error}\n"));
        }
        output.push_str(&format!(
            "Targets enabled: {}\n",
            self.sorted_targets()
                .into_iter()
                .filter(|target| self.enabled_targets.contains(target))
                .collect::<Vec<String>>()
                .join(", ")
        ));
        output.push_str("Recent logs:\n");

        let entries = self.visible_entries();
        let start = entries.len().saturating_sub(50);
        for entry in entries.into_iter().skip(start) {
            output.push_str(&entry.format_line());
            output.push('\n');
        }

        output
    }

    fn shared_text(&self, scope: PriceScope) -> &str {
        match scope {
            PriceScope::Commodity => &self.shared_commodity_text,
            PriceScope::Distribution => &self.shared_distribution_text,
            PriceScope::FeedIn => &self.shared_feedin_text,
        }
    }

    fn set_shared_text(&mut self, scope: PriceScope, value: String) {
        match scope {
            PriceScope::Commodity => self.shared_commodity_text = value,
            PriceScope::Distribution => self.shared_distribution_text = value,
            PriceScope::FeedIn => self.shared_feedin_text = value,
        }
    }

    fn propagate_shared(&mut self, scope: PriceScope) {
        if self.controller.mode(scope) != PricingMode::Uniform {
            return;
        }

        let price = parse_price(self.shared_text(scope));
        self.controller
            .propagate_shared_price(scope, price, &mut self.objects);

        let mirror = self.shared_text(scope).to_string();
        match scope {
            PriceScope::Commodity => self.object_price_commodity = mirror,
            PriceScope::Distribution => self.object_price_distribution = mirror,
            PriceScope::FeedIn => self.object_price_feedin = mirror,
        }
    }

    fn select_object(&mut self, index: usize) {
        let Some(object) = self.objects.get(index) else {
            return;
        };

        self.selected_object = Some(index);
        self.object_name = object.name.clone();
        self.object_annual_cons = number_text(object.annual_cons_kwh);
        self.object_annual_gen = number_text(object.annual_gen_kwh);
        self.object_price_commodity = number_text(object.price_commodity);
        self.object_dist_mode = object.dist_mode;
        self.object_price_distribution = number_text(object.price_distribution);
        self.object_tariff = object.tariff.clone().unwrap_or_default();
        self.object_price_feedin = number_text(object.price_feed_in);
        self.object_pv = number_text(object.pv_kwp);
        self.object_chp = number_text(object.chp_kwe);
        self.object_battery = number_text(object.battery_kwh);
        self.object_hot_water = number_text(object.hot_water_m3);
        self.object_series_cons = object.has_series_cons;
        self.object_series_gen = object.has_series_gen;
        self.object_status = None;
    }

    fn clear_object_form(&mut self) {
        self.object_name.clear();
        self.object_annual_cons.clear();
        self.object_annual_gen.clear();
        self.object_price_commodity = self.uniform_mirror(PriceScope::Commodity);
        self.object_dist_mode = DistTariffMode::UnitPrice;
        self.object_price_distribution = self.uniform_mirror(PriceScope::Distribution);
        self.object_tariff.clear();
        self.object_price_feedin = self.uniform_mirror(PriceScope::FeedIn);
        self.object_pv.clear();
        self.object_chp.clear();
        self.object_battery.clear();
        self.object_hot_water.clear();
        self.object_series_cons = false;
        self.object_series_gen = false;
        self.object_status = None;
    }

    fn uniform_mirror(&self, scope: PriceScope) -> String {
        if self.controller.mode(scope) == PricingMode::Uniform {
            self.shared_text(scope).to_string()
        } else {
            String::new()
        }
    }

    fn apply_object_form(&mut self) {
        let name = self.object_name.trim().to_string();
        if name.is_empty() {
            self.object_status = Some("Name is required.".to_string());
            return;
        }

        let object = match self.parse_object_form(name) {
            Ok(object) => object,
            Err(message) => {
                self.object_status = Some(message);
                return;
            }
        };

        match self.selected_object {
            Some(index) if index < self.objects.len() => {
                tracing::info!(target: targets::OBJECTS, "Updated metering object {}", object.name);
                self.object_status = Some(format!("Updated {}.", object.name));
                self.objects[index] = object;
            }
            _ => {
                tracing::info!(target: targets::OBJECTS, "Added metering object {}", object.name);
                self.object_status = Some(format!("Added {}.", object.name));
                self.objects.push(object);
                self.selected_object = Some(self.objects.len() - 1);
            }
        }
    }

    fn parse_object_form(&self, name: String) -> Result<MeteringObject, String> {
        let mut object = MeteringObject::new(name);
        object.annual_cons_kwh =
            parse_optional_number("annual consumption", &self.object_annual_cons)?;
        object.annual_gen_kwh =
            parse_optional_number("annual generation", &self.object_annual_gen)?;
        object.price_commodity =
            parse_optional_number("commodity price", &self.object_price_commodity)?;
        object.dist_mode = self.object_dist_mode;
        match self.object_dist_mode {
            DistTariffMode::UnitPrice => {
                object.price_distribution =
                    parse_optional_number("distribution price", &self.object_price_distribution)?;
            }
            DistTariffMode::Tariff => {
                let tariff = self.object_tariff.trim();
                object.tariff = if tariff.is_empty() {
                    None
                } else {
                    Some(tariff.to_string())
                };
            }
        }
        object.price_feed_in = parse_optional_number("feed-in price", &self.object_price_feedin)?;
        object.pv_kwp = parse_optional_number("PV kWp", &self.object_pv)?;
        object.chp_kwe = parse_optional_number("CHP kWe", &self.object_chp)?;
        object.battery_kwh = parse_optional_number("battery kWh", &self.object_battery)?;
        object.hot_water_m3 = parse_optional_number("hot water m3", &self.object_hot_water)?;
        object.has_series_cons = self.object_series_cons;
        object.has_series_gen = self.object_series_gen;
        Ok(object)
    }

    fn delete_selected_object(&mut self) {
        if self.active_tab != Tab::Settings {
            return;
        }
        let Some(index) = self.selected_object else {
            return;
        };
        if index >= self.objects.len() {
            self.selected_object = None;
            return;
        }

        let removed = self.objects.remove(index);
        self.selected_object = None;
        self.clear_object_form();
        self.object_status = Some(format!("Deleted {}.", removed.name));
        tracing::info!(target: targets::OBJECTS, "Deleted metering object {}", removed.name);
    }

    fn check_service(&mut self) -> Command<Message> {
        let Some(client) = self.client.clone() else {
            return Command::none();
        };

        self.service_status = Some("Checking service.".to_string());
        Command::perform(
            async move {
                match client.health().await {
                    Ok(true) => client.version().await.map_err(|error| ApiErrorInfo {
                        summary: error.user_summary(),
                        detail: error.technical_detail(),
                    }),
                    Ok(false) => Err(ApiErrorInfo {
                        summary: "Service reported a failing health check.".to_string(),
                        detail: "GET /health returned ok=false.".to_string(),
                    }),
                    Err(error) => Err(ApiErrorInfo {
                        summary: error.user_summary(),
                        detail: error.technical_detail(),
                    }),
                }
            },
            Message::ServiceChecked,
        )
    }

    fn start_run(&mut self) -> Command<Message> {
        if self.run_in_flight {
            return Command::none();
        }
        let Some(client) = self.client.clone() else {
            self.run_status = Some("Service client unavailable.".to_string());
            return Command::none();
        };

        let consumption = self.consumption_csv.trim().to_string();
        let generation = self.generation_csv.trim().to_string();
        let selfcons = self.selfcons_csv.trim().to_string();
        if consumption.is_empty() || generation.is_empty() || selfcons.is_empty() {
            self.run_status = Some("All three input CSV files are required.".to_string());
            return Command::none();
        }

        let params = Step3Params {
            price_commodity_mwh: parse_price(&self.shared_commodity_text)
                .unwrap_or(DEFAULT_PRICE_COMMODITY_MWH),
            price_distribution_mwh: parse_price(&self.shared_distribution_text)
                .unwrap_or(DEFAULT_PRICE_DISTRIBUTION_MWH),
            price_feed_in_mwh: parse_price(&self.shared_feedin_text)
                .unwrap_or(DEFAULT_PRICE_FEED_IN_MWH),
            mode: self.method,
            max_recipients: parse_count(&self.max_recipients_text)
                .unwrap_or(DEFAULT_MAX_RECIPIENTS),
            ..Step3Params::default()
        };

        self.run_id = self.run_id.saturating_add(1);
        let run_id = self.run_id;
        self.run_in_flight = true;
        self.run_report = None;
        self.run_status = Some("Uploading input files and starting step 3.".to_string());
        tracing::info!(target: targets::API, "Starting step3 run {}", run_id);

        Command::perform(
            run_distribution(client, consumption, generation, selfcons, params),
            move |result| Message::RunFinished { run_id, result },
        )
    }

    fn handle_run_finished(
        &mut self,
        run_id: u64,
        result: Result<RunReport, ApiErrorInfo>,
    ) -> Command<Message> {
        if run_id != self.run_id {
            tracing::debug!(target: targets::API, "Discarding stale run result {}", run_id);
            return Command::none();
        }

        self.run_in_flight = false;
        self.run_finished_at = Some(now_epoch_seconds());

        match result {
            Ok(report) => {
                let return_code = report
                    .return_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "-".to_string());
                if report.ok {
                    self.run_status = Some("Step 3 finished. Outputs refreshed.".to_string());
                    tracing::info!(
                        target: targets::API,
                        "Step3 run finished, return code {}",
                        return_code
                    );
                } else {
                    let detail = report
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("return code {return_code}"));
                    self.run_status = Some(format!("Step 3 failed: {detail}"));
                    tracing::warn!(target: targets::API, "Step3 run failed: {}", detail);
                }
                self.run_report = Some(report);
            }
            Err(error) => {
                self.run_status = Some(format!("Run failed: {}", error.summary));
                self.last_api_error = Some(error.detail.clone());
                tracing::warn!(target: targets::API, "Step3 run error: {}", error.detail);
            }
        }

        // Even a failed run may have written partial outputs.
        Command::batch(vec![self.fetch_outputs(), self.fetch_summary()])
    }

    fn fetch_outputs(&mut self) -> Command<Message> {
        if self.outputs_in_flight {
            return Command::none();
        }
        let Some(client) = self.client.clone() else {
            return Command::none();
        };

        self.outputs_in_flight = true;
        Command::perform(
            async move {
                client.list_outputs().await.map_err(|error| ApiErrorInfo {
                    summary: error.user_summary(),
                    detail: error.technical_detail(),
                })
            },
            Message::OutputsLoaded,
        )
    }

    fn fetch_summary(&mut self) -> Command<Message> {
        if self.summary_in_flight {
            return Command::none();
        }
        let Some(client) = self.client.clone() else {
            return Command::none();
        };

        self.summary_in_flight = true;
        Command::perform(
            async move {
                client.summary_step3().await.map_err(|error| ApiErrorInfo {
                    summary: error.user_summary(),
                    detail: error.technical_detail(),
                })
            },
            Message::SummaryLoaded,
        )
    }

    fn copy_download_link(&mut self, name: &str) {
        let Some(client) = &self.client else {
            return;
        };

        let url = client.download_url(name);
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(url)) {
            Ok(()) => {
                self.export_status = Some(format!("Link for {name} copied."));
                tracing::info!(target: targets::UI, "Download link copied for {}", name);
            }
            Err(error) => {
                self.export_status = Some(format!("Clipboard failed: {error}"));
                tracing::warn!(target: targets::UI, "Clipboard copy failed: {}", error);
            }
        }
    }

    fn save_output(&mut self, name: String) -> Command<Message> {
        let Some(client) = self.client.clone() else {
            return Command::none();
        };

        let dir = self.export_dir.trim().to_string();
        let dir = if dir.is_empty() { ".".to_string() } else { dir };
        self.export_status = Some(format!("Saving {name}."));

        Command::perform(
            async move {
                let bytes = client
                    .fetch_output(&name)
                    .await
                    .map_err(|error| ApiErrorInfo {
                        summary: error.user_summary(),
                        detail: error.technical_detail(),
                    })?;

                let path = Path::new(&dir).join(&name);
                fs::write(&path, bytes).map_err(|source| {
                    let error = Error::StorageIo {
                        action: StorageAction::Save,
                        path: Some(path.display().to_string()),
                        source,
                    };
                    ApiErrorInfo {
                        summary: error.user_summary(),
                        detail: error.technical_detail(),
                    }
                })?;

                Ok(path.display().to_string())
            },
            Message::OutputSaved,
        )
    }
}

async fn run_distribution(
    client: ServiceClient,
    consumption_csv: String,
    generation_csv: String,
    selfcons_csv: String,
    mut params: Step3Params,
) -> Result<RunReport, ApiErrorInfo> {
    let result = async {
        params.eano_after_pv_csv =
            upload_input(&client, UPLOAD_KEY_CONSUMPTION, &consumption_csv).await?;
        params.eand_after_pv_csv =
            upload_input(&client, UPLOAD_KEY_GENERATION, &generation_csv).await?;
        params.local_selfcons_csv =
            upload_input(&client, UPLOAD_KEY_SELF_CONSUMPTION, &selfcons_csv).await?;
        client.run_step3(&params).await
    }
    .await;

    result.map_err(|error| ApiErrorInfo {
        summary: error.user_summary(),
        detail: error.technical_detail(),
    })
}

async fn upload_input(client: &ServiceClient, key: &str, path: &str) -> Result<String, Error> {
    let bytes = fs::read(path).map_err(|source| Error::StorageIo {
        action: StorageAction::Load,
        path: Some(path.to_string()),
        source,
    })?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(key)
        .to_string();

    let response = client.upload(key, &file_name, bytes).await?;
    if response.path.trim().is_empty() {
        Ok(upload_fallback_path(key))
    } else {
        Ok(response.path)
    }
}

fn level_color(level: tracing::Level) -> Color {
    match level {
        tracing::Level::ERROR => Color::from_rgb8(0xe0, 0x4f, 0x4f),
        tracing::Level::WARN => Color::from_rgb8(0xe0, 0xb0, 0x4f),
        tracing::Level::INFO => Color::from_rgb8(0x3b, 0x82, 0xf6),
        tracing::Level::DEBUG => Color::from_rgb8(0x22, 0x7d, 0x64),
        tracing::Level::TRACE => Color::from_rgb8(0x6b, 0x72, 0x80),
    }
}

fn delete_key_event(
    key: keyboard::Key,
    _modifiers: keyboard::Modifiers,
) -> Option<Message> {
    match key {
        keyboard::Key::Named(keyboard::key::Named::Delete) => {
            Some(Message::DeleteSelectedObject)
        }
        _ => None,
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn shared_placeholder(scope: PriceScope) -> &'static str {
    match scope {
        PriceScope::Commodity => "2200",
        PriceScope::Distribution => "1800",
        PriceScope::FeedIn => "1200",
    }
}

fn parse_price(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|number| number.is_finite())
}

fn parse_count(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}

fn parse_optional_number(label: &str, value: &str) -> Result<Option<f64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(Some(number)),
        _ => Err(format!("Invalid number for {label}: '{value}'.")),
    }
}

fn number_text(value: Option<f64>) -> String {
    value.map(|number| format!("{number}")).unwrap_or_default()
}

fn cell_or_dash(value: String) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value
    }
}

fn seed_objects() -> Vec<MeteringObject> {
    Vec::new()
}
