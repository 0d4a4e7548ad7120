use std::rc::Rc;

use adw::Application;
use adw::prelude::*;
use log::warn;

use crate::app::AppState;
use crate::state::sessions::Selection;
use crate::storage::SessionCache;
use crate::ui::Shell;
use crate::ui::balance::CreditBalance;
use crate::ui::chat_view::ChatView;
use crate::ui::sidebar::Sidebar;

pub fn show_main_window(app: &Application) {
    let state = AppState::load();
    let client = match state.client() {
        Ok(client) => client,
        Err(e) => {
            warn!("cannot build API client: {e}");
            crate::ui::login::show_login_window(app);
            return;
        }
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Virtual-G")
        .default_width(1080)
        .default_height(720)
        .build();

    let overlay = adw::ToastOverlay::new();
    let shell = Rc::new(Shell::new(app, &window, &overlay, client, state.stripe_publishable_key.clone()));

    let cache = SessionCache::open_default()
        .map_err(|e| warn!("session cache unavailable: {e}"))
        .ok();
    let sidebar = Sidebar::new(shell.clone(), cache);
    let chat = ChatView::new(shell.clone());
    let balance = CreditBalance::new(shell.clone());

    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .flap_position(gtk4::PackType::End)
        .build();
    split.set_flap(Some(&sidebar.widget()));
    split.set_separator(Some(&gtk4::Separator::new(gtk4::Orientation::Vertical)));
    split.set_content(Some(&chat.widget()));
    overlay.set_child(Some(&split));

    let container = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = adw::WindowTitle::new("Virtual-G", state.email.as_deref().unwrap_or_default());
    header.set_title_widget(Some(&title));

    header.pack_start(&balance.widget());
    let buy_btn = gtk4::Button::with_label("Buy Credits");
    buy_btn.add_css_class("suggested-action");
    header.pack_start(&buy_btn);

    let sessions_btn = gtk4::ToggleButton::builder()
        .icon_name("sidebar-show-right-symbolic")
        .tooltip_text("Chat sessions")
        .active(true)
        .build();
    split.bind_property("reveal-flap", &sessions_btn, "active")
        .bidirectional()
        .sync_create()
        .build();
    let logout_btn = gtk4::Button::from_icon_name("system-log-out-symbolic");
    logout_btn.set_tooltip_text(Some("Logout"));
    let profile_btn = gtk4::Button::from_icon_name("avatar-default-symbolic");
    profile_btn.set_tooltip_text(Some("Profile"));
    let voice_btn = gtk4::Button::from_icon_name("audio-input-microphone-symbolic");
    voice_btn.set_tooltip_text(Some("Voice chat"));
    header.pack_end(&sessions_btn);
    header.pack_end(&logout_btn);
    header.pack_end(&profile_btn);
    header.pack_end(&voice_btn);

    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));

    {
        let chat = chat.clone();
        sidebar.connect_selected(move |selection| match selection {
            Selection::Selected(id) => chat.show_session(Some(id)),
            Selection::Cleared => chat.show_session(None),
            Selection::Unchanged => {}
        });
    }
    {
        let sidebar = sidebar.clone();
        let balance = balance.clone();
        chat.connect_replied(move || {
            sidebar.refresh();
            balance.refresh();
        });
    }
    {
        let shell = shell.clone();
        let balance = balance.clone();
        chat.connect_purchase_required(move |shortfall| {
            let balance = balance.clone();
            crate::ui::payment_dialog::show_payment_dialog(&shell, Some(shortfall), move || balance.refresh());
        });
    }
    {
        let shell = shell.clone();
        let balance = balance.clone();
        buy_btn.connect_clicked(move |_| {
            let balance = balance.clone();
            crate::ui::payment_dialog::show_payment_dialog(&shell, None, move || balance.refresh());
        });
    }
    {
        let shell = shell.clone();
        let balance = balance.clone();
        voice_btn.connect_clicked(move |_| {
            let balance = balance.clone();
            crate::ui::voice_dialog::show_voice_dialog(&shell, move || balance.refresh());
        });
    }
    {
        let shell = shell.clone();
        profile_btn.connect_clicked(move |_| crate::ui::profile_dialog::show_profile_dialog(&shell));
    }
    {
        let shell = shell.clone();
        logout_btn.connect_clicked(move |_| shell.sign_out());
    }

    window.present();

    sidebar.refresh();
    chat.show_session(None);
    balance.refresh();
}
