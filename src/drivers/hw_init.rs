//! One-shot GPIO and interrupt initialization.
//!
//! Configures the button input and registers its edge interrupt using raw
//! ESP-IDF sys calls. Called once from `AppContext` wiring in `main()`
//! before any task is spawned.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::adapters::time::Esp32Ticks;
#[cfg(target_os = "espidf")]
use crate::drivers::button::ButtonIsr;
use crate::error::Result;
#[cfg(target_os = "espidf")]
use crate::error::InitError;
#[cfg(target_os = "espidf")]
use crate::pins;

// ── Button input ──────────────────────────────────────────────

/// Button GPIO: input, pull-up, interrupt on both edges.
#[cfg(target_os = "espidf")]
pub fn init_button_input() -> Result<()> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::BUTTON_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
        ..Default::default()
    };
    // SAFETY: plain register configuration of a pin nothing else owns.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(InitError::Gpio(ret).into());
    }
    info!("hw_init: button on GPIO{} (any edge, pull-up)", pins::BUTTON_GPIO);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_button_input() -> Result<()> {
    log::info!("hw_init(sim): button input skipped");
    Ok(())
}

// ── Edge interrupt ────────────────────────────────────────────

/// GPIO interrupt handler. `arg` is the `&'static ButtonIsr` registered in
/// [`init_isr_service`].
#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` was produced from a `&'static ButtonIsr<Esp32Ticks>`
    // and is never freed.
    let isr = unsafe { &*arg.cast::<ButtonIsr<Esp32Ticks>>() };
    isr.on_interrupt(gpio_read(pins::BUTTON_GPIO));
}

/// Install the per-pin ISR service and attach the button handler.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(isr: &'static ButtonIsr<Esp32Ticks>) -> Result<()> {
    // SAFETY: called once at boot; `isr` outlives the program.
    unsafe {
        let ret = gpio_install_isr_service(0);
        // Already installed by another component is fine.
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(InitError::IsrService(ret).into());
        }
        let arg = core::ptr::from_ref(isr).cast_mut().cast();
        let ret = gpio_isr_handler_add(pins::BUTTON_GPIO, Some(button_gpio_isr), arg);
        if ret != ESP_OK as i32 {
            return Err(InitError::IsrService(ret).into());
        }
    }
    info!("hw_init: button ISR attached");
    Ok(())
}

/// Host builds drive `ButtonIsr::on_interrupt` directly.
#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service<T>(_isr: &'static crate::drivers::button::ButtonIsr<T>) -> Result<()> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

// ── Level read ────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: read-only register access on a configured input; ISR-safe.
    (unsafe { gpio_get_level(pin) }) != 0
}

/// Host: released (pull-up level).
#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    true
}
